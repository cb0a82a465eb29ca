pub mod booking;
pub mod domain;
pub mod messaging;
pub mod ports;
pub mod pricing;
pub mod session;

pub use domain::{
    AuthSession, BookingConfirmation, BookingRequest, ConfirmationReport, ConfirmationRequest,
    Contact, IdentitySession, Message, MessageStatus, Profile, ProfileUpdate, UserType,
};
pub use ports::{
    AuthEvent, AuthEventKind, AuthEventStream, AuthProvider, EmailSender, FieldServiceCrm,
    MessageStore, PortError, PortResult, ProfileStore, ServiceTypeSource, SmsSender,
};
pub use pricing::{compute_total, Quote, QuoteTotal, ServiceCatalog, ServiceType};
pub use session::{AuthFailure, AuthState, AuthStore, AuthStoreReader, SessionController};
