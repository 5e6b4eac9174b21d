/// Kind tag of a badge definition record (parameterized replaceable)
pub const DEFINITION_KIND: u32 = 30009;

/// Kind tag of the recipient's displayed-badges record (parameterized replaceable)
pub const PROFILE_BADGES_KIND: u32 = 30008;

/// Kind tag of a badge award record
pub const AWARD_KIND: u32 = 8;

/// Discriminator (`d` tag) that locates the one displayed-badges record per owner
pub const PROFILE_BADGES_DISCRIMINATOR: &str = "profile_badges";

/// Length of a hex-encoded 32-byte key or record identifier
pub const HEX_ID_LEN: usize = 64;

/// Length of the record-id prefix embedded in backup snapshot keys
pub const SNAPSHOT_ID_PREFIX_LEN: usize = 8;

/// Number of backup snapshots kept by retention pruning
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Relay timeouts, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_RESPONSE_WINDOW_SECS: u64 = 5;
pub const DEFAULT_VERIFY_WINDOW_SECS: u64 = 4;
pub const DEFAULT_FETCH_WINDOW_SECS: u64 = 4;

/// Public relays used when nothing is configured
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://nostr.wine",
    "wss://offchain.pub",
    "wss://relay.snort.social",
    "wss://relay.primal.net",
    "wss://relay.nostr.band",
];
