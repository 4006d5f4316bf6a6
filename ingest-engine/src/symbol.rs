use std::{path::Path, sync::Arc};

use core_types::config::SourceConfig;

/// Symbol for a source file: `trades.AAPL` yields `AAPL`, a name without a `.` is
/// used as-is.
pub fn symbol_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => name,
    }
}

/// Configured symbol if there is one, otherwise derived from the path.
pub fn resolve_symbol(source: &SourceConfig) -> Arc<str> {
    match source.symbol.as_deref() {
        Some(symbol) if !symbol.is_empty() => Arc::from(symbol),
        _ => Arc::from(symbol_from_path(&source.path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_follows_the_first_dot() {
        assert_eq!(symbol_from_path(Path::new("/data/trades.AAPL")), "AAPL");
        assert_eq!(symbol_from_path(Path::new("quotes.BRK.B")), "BRK.B");
        assert_eq!(symbol_from_path(Path::new("/data/MSFT")), "MSFT");
        assert_eq!(symbol_from_path(Path::new("trailing.")), "trailing.");
    }

    #[test]
    fn configured_symbol_wins() {
        let source = SourceConfig::with_symbol("/data/trades.AAPL", "XYZ");
        assert_eq!(&*resolve_symbol(&source), "XYZ");
        let source = SourceConfig::new("/data/trades.AAPL");
        assert_eq!(&*resolve_symbol(&source), "AAPL");
    }
}
