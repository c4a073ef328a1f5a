//! Dispatch from a classified intent to a marketplace operation or a static
//! reply, for users that have completed onboarding. The match is exhaustive
//! over the intent enum: a newly added intent will not compile until it is
//! routed.

use crate::domain::user::User;
use crate::intent::{ClassifiedIntent, IntentKind};
use crate::reply;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketOp {
    FarmersNearby,
    Sell,
    Buy,
    MarketPrice,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    Reply(String),
    Operation(MarketOp),
}

pub fn route(user: &User, intent: &ClassifiedIntent) -> Route {
    match &intent.kind {
        IntentKind::Greeting => Route::Reply(reply::greeting(user)),
        // The NLU service is known to misclassify greetings from registered
        // users as role choices; roles are immutable after onboarding, so
        // these route to the greeting handler.
        IntentKind::ChooseFarmer | IntentKind::ChooseConsumer => {
            Route::Reply(reply::greeting(user))
        }
        IntentKind::FarmersNearby => Route::Operation(MarketOp::FarmersNearby),
        IntentKind::Sell => Route::Operation(MarketOp::Sell),
        IntentKind::Buy => Route::Operation(MarketOp::Buy),
        IntentKind::MarketPrice => Route::Operation(MarketOp::MarketPrice),
        IntentKind::GiveName | IntentKind::GiveLocation => Route::Reply(
            reply::not_yet_supported(user.display_name(), intent.kind.slug()),
        ),
        IntentKind::Unknown(slug) => {
            Route::Reply(reply::not_yet_supported(user.display_name(), slug))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::user::{User, UserId, UserRole};
    use crate::intent::{ClassifiedIntent, IntentKind};

    use super::{route, MarketOp, Route};

    fn farmer() -> User {
        User {
            id: UserId("U2".to_string()),
            name: Some("Kofi".to_string()),
            location: None,
            role: Some(UserRole::Farmer),
            action: None,
            requirements: Vec::new(),
        }
    }

    #[test]
    fn marketplace_intents_route_to_operations() {
        let user = farmer();

        assert_eq!(
            route(&user, &ClassifiedIntent::bare(IntentKind::FarmersNearby)),
            Route::Operation(MarketOp::FarmersNearby)
        );
        assert_eq!(
            route(&user, &ClassifiedIntent::bare(IntentKind::Sell)),
            Route::Operation(MarketOp::Sell)
        );
        assert_eq!(
            route(&user, &ClassifiedIntent::bare(IntentKind::Buy)),
            Route::Operation(MarketOp::Buy)
        );
        assert_eq!(
            route(&user, &ClassifiedIntent::bare(IntentKind::MarketPrice)),
            Route::Operation(MarketOp::MarketPrice)
        );
    }

    #[test]
    fn misclassified_role_choice_routes_to_greeting() {
        let user = farmer();
        let routed = route(&user, &ClassifiedIntent::bare(IntentKind::ChooseFarmer));

        match routed {
            Route::Reply(text) => assert!(text.contains("Hello Kofi")),
            Route::Operation(_) => panic!("role choice after onboarding must not be an operation"),
        }
    }

    #[test]
    fn unknown_slug_falls_back_with_name_and_slug_echoed() {
        let user = farmer();
        let routed = route(
            &user,
            &ClassifiedIntent::bare(IntentKind::Unknown("tell_joke".to_string())),
        );

        match routed {
            Route::Reply(text) => {
                assert!(text.contains("Kofi"));
                assert!(text.contains("tell_joke"));
            }
            Route::Operation(_) => panic!("unknown slug must fall back to a reply"),
        }
    }
}
