//! Runtime mapping between live objects and table rows.
//!
//! Both directions are pure functions over an immutable [`Schema`]; they
//! hold no state and can run concurrently.
//!
//! [`Schema`]: crate::schema::Schema

mod extract;
mod reconstitute;

pub use extract::{Extraction, Extractor, RelationChanges};
pub use reconstitute::{Construction, MemoryResolver, Reconstitutor, ReferenceResolver, RelationRows};

pub(crate) use extract::principal_row;

use crate::value::Value;

/// One row of a table, cells in column order.
pub type Row = Vec<Value>;

/// Join member names into the path used in relation `Source` columns and
/// error messages.
fn join_path(prefix: &str, member: &str) -> String {
    if prefix.is_empty() {
        member.to_string()
    } else {
        format!("{}.{}", prefix, member)
    }
}
