pub mod bids;
pub mod disputes;
pub mod invites;
pub mod loads;
pub mod payments;
pub mod subscriptions;
pub mod sweeps;
