/// Announcement wall time used when a schedule does not specify one.
pub const DEFAULT_POST_TIME: &str = "09:00";

/// Announcements go out this many days before the event unless configured otherwise.
pub const DEFAULT_POST_OFFSET_DAYS: u32 = 6;

/// Interval of the fallback re-check armed when no schedule has a candidate.
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 60 * 60;

/// Reaction added to every announcement so members can RSVP.
pub const RSVP_EMOJI: &str = "\u{1F44D}";

/// Placeholder shown in the audit log when an event has no location yet.
pub const NO_LOCATION_TEXT: &str = "No Location Set";

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
