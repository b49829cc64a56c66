mod archive;
mod language;

pub use archive::{list_entries, MAX_ARCHIVE_ENTRIES};
pub use language::Language;

#[cfg(test)]
pub(crate) use archive::tests::build_zip;
