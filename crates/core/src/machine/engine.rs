use std::sync::Arc;

use tracing::info;

use crate::domain::user::{User, UserId};
use crate::errors::EngineError;
use crate::intent::ClassifiedIntent;
use crate::machine::states::{evaluate_step, ProfileUpdate, StepOutcome};
use crate::market::MarketplaceEngine;
use crate::ports::{ConversationStore, IntentExtractor};
use crate::reply;
use crate::router::{route, MarketOp, Route};

/// The per-user conversation state machine. One inbound message produces one
/// reply; side effects go through the store ports. Callers are responsible
/// for serializing messages per user id (see the telegram runner's gate);
/// messages for different users may run concurrently.
pub struct ConversationMachine {
    users: Arc<dyn ConversationStore>,
    extractor: Arc<dyn IntentExtractor>,
    market: MarketplaceEngine,
}

impl ConversationMachine {
    pub fn new(
        users: Arc<dyn ConversationStore>,
        extractor: Arc<dyn IntentExtractor>,
        market: MarketplaceEngine,
    ) -> Self {
        Self { users, extractor, market }
    }

    /// Advances the state machine for one inbound message and returns the
    /// reply text. Errors are collaborator or invariant failures only;
    /// validation outcomes are ordinary replies.
    pub async fn advance(&self, user_id: &UserId, text: &str) -> Result<String, EngineError> {
        let Some(user) = self.users.get_user(user_id).await? else {
            self.users.create_user(user_id).await?;
            info!(event_name = "conversation.user.created", user_id = %user_id, "new user started onboarding");
            return Ok(reply::welcome().to_string());
        };

        let intent = self.extractor.classify(text).await?;

        if user.is_onboarding() {
            self.advance_onboarding(&user, &intent).await
        } else {
            self.dispatch(&user, &intent).await
        }
    }

    async fn advance_onboarding(
        &self,
        user: &User,
        intent: &ClassifiedIntent,
    ) -> Result<String, EngineError> {
        // Empty queue while still tagged onboarding: terminal-complete.
        let Some(step) = user.requirements.first().copied() else {
            self.users.clear_state(&user.id).await?;
            return Ok(reply::onboarding_complete(user.display_name()));
        };

        match evaluate_step(user, step, intent) {
            StepOutcome::Retry { reply } => Ok(reply),
            StepOutcome::Satisfied { update, reply } => {
                match update {
                    ProfileUpdate::Name(name) => {
                        self.users.set_name(&user.id, &name).await?;
                        self.users.pop_front_requirement(&user.id).await?;
                    }
                    ProfileUpdate::Location(point) => {
                        self.users.set_location(&user.id, point).await?;
                        self.users.pop_front_requirement(&user.id).await?;
                    }
                    ProfileUpdate::Role(role) => {
                        // The role step completes onboarding in one move:
                        // the whole queue and the action tag are cleared.
                        self.users.set_role(&user.id, role).await?;
                        self.users.clear_state(&user.id).await?;
                        info!(
                            event_name = "conversation.onboarding.completed",
                            user_id = %user.id,
                            role = role.as_str(),
                            "onboarding complete"
                        );
                    }
                }
                Ok(reply)
            }
        }
    }

    async fn dispatch(&self, user: &User, intent: &ClassifiedIntent) -> Result<String, EngineError> {
        match route(user, intent) {
            Route::Reply(text) => Ok(text),
            Route::Operation(MarketOp::FarmersNearby) => self.market.farmers_nearby(user).await,
            Route::Operation(MarketOp::Sell) => self.market.sell(user, &intent.slots).await,
            Route::Operation(MarketOp::Buy) => self.market.buy(user, &intent.slots).await,
            Route::Operation(MarketOp::MarketPrice) => self.market.market_price(&intent.slots).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::geo::GeoPoint;
    use crate::domain::user::{OnboardingStep, UserId, UserRole};
    use crate::errors::EngineError;
    use crate::intent::{ClassifiedIntent, IntentKind, IntentSlots};
    use crate::market::MarketplaceEngine;
    use crate::testing::{FailingExtractor, MemoryStore, RecordingNotifier, ScriptedExtractor};

    use super::ConversationMachine;

    fn machine(store: Arc<MemoryStore>, extractor: ScriptedExtractor) -> ConversationMachine {
        let market = MarketplaceEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        ConversationMachine::new(store, Arc::new(extractor), market)
    }

    fn give_name(name: &str) -> ClassifiedIntent {
        ClassifiedIntent {
            kind: IntentKind::GiveName,
            slots: IntentSlots { name: Some(name.to_string()), ..IntentSlots::default() },
        }
    }

    fn give_location(lat: f64, lng: f64) -> ClassifiedIntent {
        ClassifiedIntent {
            kind: IntentKind::GiveLocation,
            slots: IntentSlots {
                location: Some(GeoPoint::new(lat, lng)),
                ..IntentSlots::default()
            },
        }
    }

    #[tokio::test]
    async fn first_message_creates_the_user_and_returns_the_welcome_prompt() {
        let store = Arc::new(MemoryStore::default());
        let machine = machine(store.clone(), ScriptedExtractor::default());
        let id = UserId("U1".to_string());

        let text = machine.advance(&id, "hi there").await.unwrap();

        assert!(text.contains("what is your name"), "got {text}");
        let user = store.user(&id).expect("user was created");
        assert!(user.is_onboarding());
        assert_eq!(user.requirements.len(), 3);
    }

    #[tokio::test]
    async fn name_step_persists_the_name_and_pops_the_queue() {
        let store = Arc::new(MemoryStore::default());
        let extractor = ScriptedExtractor::default().on("I am Ana", give_name("Ana"));
        let machine = machine(store.clone(), extractor);
        let id = UserId("U1".to_string());

        machine.advance(&id, "hello").await.unwrap();
        let text = machine.advance(&id, "I am Ana").await.unwrap();

        assert!(text.contains("Ana"));
        let user = store.user(&id).unwrap();
        assert_eq!(user.name.as_deref(), Some("Ana"));
        assert_eq!(user.requirements, vec![OnboardingStep::Location, OnboardingStep::Role]);
    }

    #[tokio::test]
    async fn onboarding_is_strictly_ordered() {
        let store = Arc::new(MemoryStore::default());
        let extractor =
            ScriptedExtractor::default().on("I live in Lagos", give_location(6.52, 3.38));
        let machine = machine(store.clone(), extractor);
        let id = UserId("U1".to_string());

        machine.advance(&id, "hello").await.unwrap();
        // Location intent arrives while the front of the queue is still Name.
        let text = machine.advance(&id, "I live in Lagos").await.unwrap();

        assert!(text.contains("name"), "must re-prompt for the name: {text}");
        let user = store.user(&id).unwrap();
        assert_eq!(user.location, None);
        assert_eq!(user.requirements.len(), 3, "queue must not advance");
    }

    #[tokio::test]
    async fn role_step_completes_onboarding_in_one_move() {
        let store = Arc::new(MemoryStore::default());
        let extractor = ScriptedExtractor::default()
            .on("I am Ana", give_name("Ana"))
            .on("I live in Lagos", give_location(6.52, 3.38))
            .on("I am a farmer", ClassifiedIntent::bare(IntentKind::ChooseFarmer));
        let machine = machine(store.clone(), extractor);
        let id = UserId("U1".to_string());

        machine.advance(&id, "hello").await.unwrap();
        machine.advance(&id, "I am Ana").await.unwrap();
        machine.advance(&id, "I live in Lagos").await.unwrap();
        let text = machine.advance(&id, "I am a farmer").await.unwrap();

        assert!(text.contains("farmer"), "role-specific welcome: {text}");
        let user = store.user(&id).unwrap();
        assert_eq!(user.role, Some(UserRole::Farmer));
        assert!(!user.is_onboarding());
        assert!(user.requirements.is_empty());
    }

    #[tokio::test]
    async fn failed_step_is_a_self_loop_that_can_be_retried() {
        let store = Arc::new(MemoryStore::default());
        let extractor = ScriptedExtractor::default()
            .on("mumble", ClassifiedIntent::bare(IntentKind::Unknown("small_talk".to_string())))
            .on("I am Ana", give_name("Ana"));
        let machine = machine(store.clone(), extractor);
        let id = UserId("U1".to_string());

        machine.advance(&id, "hello").await.unwrap();
        machine.advance(&id, "mumble").await.unwrap();
        machine.advance(&id, "mumble").await.unwrap();
        let text = machine.advance(&id, "I am Ana").await.unwrap();

        assert!(text.contains("Ana"));
        assert_eq!(store.user(&id).unwrap().requirements.len(), 2);
    }

    #[tokio::test]
    async fn active_user_greeting_is_role_conditioned() {
        let store = Arc::new(MemoryStore::default());
        let extractor =
            ScriptedExtractor::default().on("hi", ClassifiedIntent::bare(IntentKind::Greeting));
        let machine = machine(store.clone(), extractor);

        let mut user = crate::domain::user::User::onboarding(UserId("U2".to_string()));
        user.name = Some("Kofi".to_string());
        user.role = Some(UserRole::Farmer);
        user.action = None;
        user.requirements.clear();
        store.insert(user);

        let text = machine.advance(&UserId("U2".to_string()), "hi").await.unwrap();

        assert!(text.contains("Kofi"));
        assert!(text.contains("sell"));
    }

    #[tokio::test]
    async fn extractor_failure_surfaces_as_a_system_error() {
        let store = Arc::new(MemoryStore::default());
        let market = MarketplaceEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        let machine =
            ConversationMachine::new(store.clone(), Arc::new(FailingExtractor), market);
        let id = UserId("U1".to_string());

        machine.advance(&id, "hello").await.unwrap();
        let error = machine.advance(&id, "anything").await.expect_err("must propagate");

        assert!(matches!(error, EngineError::Extractor(_)));
        assert!(!error.user_message().contains("unreachable"));
    }
}
