//! Record Module
//!
//! Everything about a single stored key-value entry.
//!
//! ## Responsibilities
//! - Key name validation (character set, length, position rules)
//! - Key descriptors: ACL, retention, security attributes, flags
//! - Encoding records into the area blob and decoding them back

mod codec;
mod descriptor;
mod key;

pub use codec::{
    decode, decode_area, encode, encode_area, encode_into, encoded_len, pad_to, KeyRecord,
    HEADER_SIZE, MAX_VALUE_SIZE,
};
pub use descriptor::{AccessControl, KeyDescriptor, KeyFlags, RetentionLevel, SecurityFeatures};
pub use key::{is_key_char, validate_pattern, KeyName, MAX_KEY_NAME_LENGTH, WILDCARD};
