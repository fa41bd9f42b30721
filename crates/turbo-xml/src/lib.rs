//! Owned XML element tree.
//!
//! Documents are read with `quick-xml` into a plain [`XmlElement`] tree that
//! callers query by `/`-separated tag paths:
//!
//! ```
//! use turbo_xml::XmlElement;
//!
//! let root: XmlElement = "<show><episode n=\"1\">Pilot</episode></show>".parse().unwrap();
//! assert_eq!(root.text_at_path("episode"), Some("Pilot"));
//! assert_eq!(root.element_at_path("episode").unwrap().attribute("n"), Some("1"));
//! ```

pub use self::element::XmlElement;
pub use self::error::{Error, Result};

mod element;
mod error;
