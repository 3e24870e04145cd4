// Page domain model - plain data aggregates, no store access

pub mod page;
pub mod page_data;

pub use page::{Crumb, Page, PageId, Translation};
pub use page_data::{PageData, TranslationData};
