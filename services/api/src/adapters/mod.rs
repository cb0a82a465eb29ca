pub mod db;
pub mod housecall_pro;
pub mod resend;
pub mod supabase_auth;
pub mod twilio;

pub use db::DbAdapter;
pub use housecall_pro::HousecallProAdapter;
pub use resend::ResendEmailAdapter;
pub use supabase_auth::{SupabaseAuthAdapter, SupabaseAuthClient};
pub use twilio::TwilioSmsAdapter;
