use crate::error::BinderError;

/// Result of a single pull: `Ok(None)` once the input is exhausted.
pub type ItemReaderResult<T> = Result<Option<T>, BinderError>;

/// A pull-based source of items, one item per call.
///
/// Readers keep their cursor behind interior mutability so several
/// consumers can share a reference; each call advances the cursor by one
/// item. A row scoped error (see [`BinderError::is_row_scoped`]) does not end
/// the sequence, the following call reads the next row.
pub trait ItemReader<T> {
    fn read(&self) -> ItemReaderResult<T>;
}
