//! Pure transformations: parameter encoding, request building, response
//! parsing and range validation. Nothing here performs I/O.

mod builder;
mod encoding;
mod mime;
mod parser;
mod validation;

pub use builder::{BuildError, BuilderConfig, JsonBuilder, RequestBuilder, UrlEncodedBuilder};
pub use encoding::{StringEncoding, check_representable, flatten_parameters, query_string};
pub use mime::mime_essence;
pub use parser::{JsonParser, ParseError, RawParser, ResponseParser, XmlParser};
pub(crate) use validation::validate_resumed_response;
pub use validation::{ContentRange, etags_match, expected_total, parse_content_range};
