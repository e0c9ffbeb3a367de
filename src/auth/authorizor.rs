use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Bid, Load, Payment, Subscription};
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Load::get_polar_class())?;
    o.register_class(Bid::get_polar_class())?;
    o.register_class(Payment::get_polar_class())?;
    o.register_class(Subscription::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use crate::entities::{BillingCycle, LoadParams, LoadStatus, PaymentStatus};

    fn user(roles: &[&str]) -> User {
        User::new(Uuid::new_v4(), roles)
    }

    fn posted_load(shipper: &User) -> Load {
        let mut load = Load::new(shipper.id, LoadParams::default(), Utc::now()).unwrap();
        load.status = LoadStatus::Posted;
        load
    }

    #[test]
    fn platform_role_test() {
        let authorizor = new().unwrap();

        let system = User::new_system_user();
        let result = authorizor.query_rule("has_role", (system.clone(), "system", Platform::marketplace()));
        assert!(result.unwrap().next().unwrap().is_ok());

        let shipper = user(&["shipper"]);
        let carrier = user(&["carrier"]);

        let result = authorizor.is_allowed(shipper.clone(), "create_load", Platform::marketplace());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), "create_load", Platform::marketplace());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(system.clone(), "run_sweeps", Platform::marketplace());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), "run_sweeps", Platform::marketplace());
        assert_eq!(result.unwrap(), false);

        let impostor = user(&["superuser"]);
        let result = authorizor.query_rule("has_role", (impostor, "superuser", Platform::marketplace()));
        assert!(result.unwrap().next().is_none());
    }

    #[test]
    fn load_owner_role_test() {
        let authorizor = new().unwrap();

        let shipper = user(&["shipper"]);
        let stranger = user(&["shipper"]);
        let load = posted_load(&shipper);

        let result = authorizor.query_rule("has_role", (shipper.clone(), "owner", load.clone()));
        assert!(result.unwrap().next().unwrap().is_ok());

        for action in ["read", "post", "cancel", "accept_bid", "complete"] {
            let result = authorizor.is_allowed(shipper.clone(), action, load.clone());
            assert_eq!(result.unwrap(), true, "owner should be allowed to {}", action);

            let result = authorizor.is_allowed(stranger.clone(), action, load.clone());
            assert_eq!(result.unwrap(), false, "stranger should not be allowed to {}", action);
        }

        let result = authorizor.is_allowed(shipper.clone(), "start_transit", load.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn load_bidder_and_assigned_carrier_role_test() {
        let authorizor = new().unwrap();

        let shipper = user(&["shipper", "carrier"]);
        let carrier = user(&["carrier"]);
        let mut load = posted_load(&shipper);

        // while the load is open

        let result = authorizor.is_allowed(carrier.clone(), "submit_bid", load.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), "read", load.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(shipper.clone(), "submit_bid", load.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(carrier.clone(), "start_transit", load.clone());
        assert_eq!(result.unwrap(), false);

        load.book(carrier.id, 100, Utc::now()).unwrap();

        // after booking

        let result = authorizor.query_rule(
            "has_role",
            (carrier.clone(), "assigned_carrier", load.clone()),
        );
        assert!(result.unwrap().next().unwrap().is_ok());

        let result = authorizor.is_allowed(carrier.clone(), "submit_bid", load.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(carrier.clone(), "start_transit", load.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), "complete", load.clone());
        assert_eq!(result.unwrap(), false);

        let other_carrier = user(&["carrier"]);
        let result = authorizor.is_allowed(other_carrier.clone(), "read", load.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn bid_bidder_role_test() {
        let authorizor = new().unwrap();

        let carrier = user(&["carrier"]);
        let other = user(&["carrier"]);
        let bid = Bid::new(Uuid::new_v4(), carrier.id, 100, None, Duration::hours(1), Utc::now())
            .unwrap();

        let result = authorizor.is_allowed(carrier.clone(), "respond", bid.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(other.clone(), "respond", bid.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn payment_roles_test() {
        let authorizor = new().unwrap();

        let shipper = user(&["shipper"]);
        let carrier = user(&["carrier"]);
        let admin = user(&["admin"]);
        let system = User::new_system_user();

        let mut load = posted_load(&shipper);
        let bid = Bid::new(load.id, carrier.id, 100, None, Duration::hours(1), Utc::now()).unwrap();
        load.book(carrier.id, bid.amount, Utc::now()).unwrap();
        let mut payment = Payment::new(&load, &bid, Utc::now());

        let result = authorizor.is_allowed(system.clone(), "open_escrow", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(shipper.clone(), "open_escrow", payment.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(carrier.clone(), "read", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(shipper.clone(), "flag_dispute", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), "flag_dispute", payment.clone());
        assert_eq!(result.unwrap(), false);

        // held funds may be moved by the rail

        payment.status = PaymentStatus::HeldInEscrow;

        let result = authorizor.is_allowed(system.clone(), "release", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(shipper.clone(), "release", payment.clone());
        assert_eq!(result.unwrap(), false);

        // disputed funds only by an admin

        payment.status = PaymentStatus::Disputed;

        let result = authorizor.is_allowed(system.clone(), "release", payment.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(system.clone(), "refund", payment.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(admin.clone(), "refund", payment.clone());
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn subscription_owner_role_test() {
        let authorizor = new().unwrap();

        let owner = user(&["shipper"]);
        let admin = user(&["admin"]);
        let subscription =
            Subscription::new(owner.id, "team".into(), BillingCycle::Annual, 5, Utc::now()).unwrap();

        let result = authorizor.is_allowed(owner.clone(), "manage", subscription.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(admin.clone(), "read", subscription.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(admin.clone(), "manage", subscription.clone());
        assert_eq!(result.unwrap(), false);
    }
}
