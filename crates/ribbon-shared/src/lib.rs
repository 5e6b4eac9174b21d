//! # ribbon-shared
//!
//! Data model shared by every ribbon crate: badge references and pairs with
//! their structural validation, the displayed-badges set, signed records and
//! the signing capability with bech32 key encodings, and the relay frame
//! codec.

pub mod badges;
pub mod constants;
pub mod error;
pub mod identity;
pub mod nip19;
pub mod protocol;
pub mod record;
pub mod types;

pub use badges::{dedup_pairs, pairs_from_record, parse_pairs, BadgeSet};
pub use error::{FrameError, SigningError, ValidationError};
pub use identity::{Keys, Signer};
pub use nip19::{encode_npub, normalize_pubkey};
pub use protocol::{Filter, InboundFrame, OutboundFrame};
pub use record::{SignedRecord, UnsignedRecord};
pub use types::{
    validate_pair, validate_set, AwardReference, BadgePair, DefinitionReference, SetValidation,
};
