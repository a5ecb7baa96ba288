//! Persistence collaborators

pub mod kills;
pub mod supabase;

pub use kills::{KillRecord, KillSink, KillStore, LoggedKills};
pub use supabase::SupabaseClient;
