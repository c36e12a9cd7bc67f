use log::{error, warn};

use crate::error::CatalogError;

use super::context::Tally;

/// Log a per-file or per-store error and count it. The caller moves on to the next file.
pub fn record_error(tally: &mut Tally, err: &CatalogError) {
    match err {
        CatalogError::InvalidPath(_) | CatalogError::UnreadablePartitionRoot { .. } => {
            warn!("{}", err)
        }
        _ => error!("{}", err),
    }
    tally.errors += 1;
}
