//! Utility functions and helpers.

pub mod slug;
pub mod url;

pub use self::slug::slugify;
pub use self::url::UrlScheme;
