mod assemble;
mod document;
mod page_index;
mod stamp;

#[cfg(test)]
pub(crate) mod testing;

pub use assemble::PageAssembler;
pub use document::DocumentHandle;
pub use page_index::PageIndex;
pub use stamp::{ImageStamp, stamp_image};
