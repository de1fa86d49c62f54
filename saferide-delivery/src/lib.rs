pub mod push;
pub mod sms;

pub use push::FcmPush;
pub use sms::TwilioSms;
