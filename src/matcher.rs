use tracing::{debug, error};

use crate::domain::LibraryId;
use crate::error::LimsError;
use crate::registry::{RegistryCache, TrackingRecord, TrackingRegistry};

/// Resolves a library ID to its single tracking sheet row, loading the
/// library's year into the cache on first use.
pub fn match_library<'a, R: TrackingRegistry>(
    cache: &'a mut RegistryCache<R>,
    library_id: &LibraryId,
) -> Result<&'a TrackingRecord, LimsError> {
    let year = library_id.year();
    let table = cache.table(&year)?;
    let hits = table.find_by_library_id(library_id.as_str());

    match hits.as_slice() {
        [record] => {
            debug!(library_id = %library_id, year = %year, "unique entry found");
            Ok(*record)
        }
        [] => {
            error!(library_id = %library_id, year = %year, "no entry for library ID");
            Err(LimsError::LibraryNotFound {
                library_id: library_id.to_string(),
                year,
            })
        }
        many => {
            error!(
                library_id = %library_id,
                year = %year,
                count = many.len(),
                "multiple entries for library ID"
            );
            Err(LimsError::DuplicateLibrary {
                library_id: library_id.to_string(),
                year,
                count: many.len(),
            })
        }
    }
}
