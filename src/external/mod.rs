pub mod documents;
pub mod payment_rail;

pub use documents::{DocumentStore, HttpDocumentStore};
pub use payment_rail::{FundsMovement, HttpPaymentRail, PaymentRail, Receipt};
