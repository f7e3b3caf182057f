mod booking;
mod event_record;
mod payment;

pub use booking::*;
pub use event_record::*;
pub use payment::*;
