mod bid;
mod invite;
mod load;
mod payment;
mod place;
mod profile;
mod subscription;

pub use bid::{Bid, Status as BidStatus};
pub use invite::{Status as InviteStatus, TeamInvite};
pub use load::{ActorRole, Load, LoadParams, Status as LoadStatus};
pub use payment::{Payment, Status as PaymentStatus};
pub use place::Place;
pub use profile::Profile;
pub use subscription::{BillingCycle, Status as SubscriptionStatus, Subscription};
