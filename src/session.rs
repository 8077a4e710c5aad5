//! Session context tying the view state machine to the synchronisation engine.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{SessionError, SyncError},
    model::{CollectionKey, Entity, EntityKind, Identity, Payload, Question, QuestionBody},
    navigation::{ApplyError, NavEvent, Plan, PlanError, PlanId, ViewState, ViewStateMachine},
    sync::{Created, Deleted, SharedEngine},
};

/// View reached by a transition, with the outcome of the refresh run on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transitioned {
    /// View now shown.
    pub view: ViewState,
    /// Failure of the entry refresh. The view is shown with its previous rows.
    pub refresh_error: Option<SyncError>,
}

/// One admin session: the current view plus the stores behind it.
pub struct Session {
    engine: SharedEngine,
    state_machine: RwLock<ViewStateMachine>,
    transition_gate: Mutex<()>,
}

impl Session {
    /// Session showing the Kahoot listing. Call [`Session::start`] to load it.
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            engine,
            state_machine: RwLock::new(ViewStateMachine::new()),
            transition_gate: Mutex::new(()),
        }
    }

    /// Engine backing this session.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Current view.
    pub async fn view(&self) -> ViewState {
        self.state_machine.read().await.view().clone()
    }

    /// Contents of the collection the current view displays.
    pub async fn contents(&self) -> Vec<Entity> {
        match self.view().await.displayed_collection() {
            Some(collection) => self.engine.subscribe(collection).await,
            None => Vec::new(),
        }
    }

    /// Load the initial view.
    pub async fn start(&self) -> Transitioned {
        let view = self.view().await;
        let refresh_error = self.enter(&view).await;
        Transitioned {
            view,
            refresh_error,
        }
    }

    /// Show the listing of `kind`.
    pub async fn select_kind(&self, kind: EntityKind) -> Result<Transitioned, SessionError> {
        self.navigate(NavEvent::SelectKind(kind)).await
    }

    /// Open the create form of the listed kind.
    pub async fn open_create(&self) -> Result<ViewState, SessionError> {
        let ((), view) = self.run_transition(NavEvent::OpenCreate, || async { Ok(()) }).await?;
        Ok(view)
    }

    /// Leave the create form without creating anything.
    pub async fn cancel(&self) -> Result<Transitioned, SessionError> {
        self.navigate(NavEvent::Cancel).await
    }

    /// Submit the create form. On failure the form stays open and nothing is shown.
    pub async fn submit_create(
        &self,
        payload: Payload,
    ) -> Result<(Entity, Transitioned), SessionError> {
        let view = self.view().await;
        if view != ViewState::Creating(payload.kind()) {
            return Err(SessionError::InvalidState(format!(
                "cannot create a {} record while in {view}",
                payload.kind()
            )));
        }

        let engine = self.engine.clone();
        let (created, view) = self
            .run_transition(NavEvent::CreateSucceeded, move || async move {
                engine.create(payload).await.map_err(SessionError::from)
            })
            .await?;

        // The engine already refetched after the create.
        let refresh_error = if self.engine.options().refresh_after_mutation {
            created.refresh_error
        } else {
            self.enter(&view).await
        };

        Ok((
            created.entity,
            Transitioned {
                view,
                refresh_error,
            },
        ))
    }

    /// Open a record of the current listing.
    pub async fn select_entity(&self, identity: Identity) -> Result<Transitioned, SessionError> {
        let view = self.view().await;
        let ViewState::Listing(kind) = view else {
            return Err(SessionError::InvalidState(format!(
                "cannot open a record while in {view}"
            )));
        };

        let entity = self
            .engine
            .subscribe(CollectionKey::root(kind))
            .await
            .into_iter()
            .find(|entity| entity.identity() == identity)
            .ok_or_else(|| {
                SessionError::InvalidState(format!("{kind} {identity} is not listed"))
            })?;

        self.navigate(NavEvent::SelectEntity(Box::new(entity))).await
    }

    /// Leave the detail view for the listing it was opened from.
    pub async fn back(&self) -> Result<Transitioned, SessionError> {
        self.navigate(NavEvent::Back).await
    }

    /// Add a question to the Kahoot shown in the detail view.
    pub async fn add_question(&self, body: QuestionBody) -> Result<Created, SessionError> {
        let view = self.view().await;
        let Some(kahoot_id) = view.question_scope() else {
            return Err(SessionError::InvalidState(format!(
                "questions can only be added from a saved kahoot, not while in {view}"
            )));
        };

        let created = self
            .engine
            .create(Payload::Question(Question { kahoot_id, body }))
            .await?;
        Ok(created)
    }

    /// Delete a record of the displayed collection. Confirmation is the caller's concern.
    pub async fn delete(&self, identity: Identity) -> Result<Deleted, SessionError> {
        let view = self.view().await;
        let collection = view.displayed_collection().ok_or_else(|| {
            SessionError::InvalidState(format!("nothing to delete while in {view}"))
        })?;

        Ok(self.engine.delete(collection, identity).await?)
    }

    async fn navigate(&self, event: NavEvent) -> Result<Transitioned, SessionError> {
        let from = self.view().await;
        let ((), view) = self.run_transition(event, || async { Ok(()) }).await?;

        // Questions added in a detail view are only kept while it is shown.
        if let Some(kahoot_id) = from.question_scope() {
            self.engine.forget(CollectionKey::questions(kahoot_id)).await;
        }

        let refresh_error = self.enter(&view).await;
        Ok(Transitioned {
            view,
            refresh_error,
        })
    }

    /// Refresh the collection a freshly entered view displays.
    async fn enter(&self, view: &ViewState) -> Option<SyncError> {
        let collection = view.displayed_collection()?;
        match self.engine.refresh(collection).await {
            Ok(outcome) => {
                debug!(%view, ?outcome, "entered view");
                None
            }
            Err(err) => {
                warn!(%view, error = %err, "refresh on view entry failed");
                Some(err)
            }
        }
    }

    async fn plan_transition(&self, event: NavEvent) -> Result<Plan, PlanError> {
        self.state_machine.write().await.plan(event)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<ViewState, ApplyError> {
        self.state_machine.write().await.apply(plan_id)
    }

    /// Plan `event`, run `work`, then apply the plan on success or abort it on failure.
    async fn run_transition<F, Fut, T>(
        &self,
        event: NavEvent,
        work: F,
    ) -> Result<(T, ViewState), SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, SessionError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event.clone()).await?;

        match work().await {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                info!(view = %next, "view changed");
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.state_machine.write().await.abort(plan_id) {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        gateway::{
            GatewayError,
            memory::{MemoryGateway, Operation},
        },
        model::{Group, Kahoot, Origin, ServerId},
        sync::{KeyPolicy, SyncEngine, SyncOptions},
    };

    fn kahoot(title: &str) -> Payload {
        Payload::Kahoot(Kahoot {
            title: title.into(),
            description: None,
            is_private: false,
            language_id: 1,
        })
    }

    fn group(name: &str) -> Payload {
        Payload::Group(Group {
            name: name.into(),
            description: None,
        })
    }

    fn session(gateway: &MemoryGateway) -> Session {
        Session::new(SyncEngine::new(
            Arc::new(gateway.clone()),
            SyncOptions::default(),
            KeyPolicy::default(),
        ))
    }

    fn backend() -> MemoryGateway {
        MemoryGateway::new().without_listing(EntityKind::Question)
    }

    fn sky() -> QuestionBody {
        QuestionBody::TrueFalse {
            question: "Sky is blue?".into(),
            answer: true,
        }
    }

    #[tokio::test]
    async fn start_loads_the_kahoot_listing() {
        let gateway = backend();
        gateway.seed(kahoot("History Trivia 101")).await;
        let session = session(&gateway);

        let entered = session.start().await;

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Kahoot));
        assert!(entered.refresh_error.is_none());
        assert_eq!(session.contents().await.len(), 1);
    }

    #[tokio::test]
    async fn selecting_a_kind_fetches_its_listing() {
        let gateway = backend();
        gateway.seed(group("Mentors")).await;
        let session = session(&gateway);

        let entered = session.select_kind(EntityKind::Group).await.unwrap();

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Group));
        assert_eq!(session.contents().await.len(), 1);
        assert_eq!(gateway.calls(Operation::Fetch).await, 1);
    }

    #[tokio::test]
    async fn failed_submit_stays_in_the_create_form() {
        let gateway = backend();
        let session = session(&gateway);
        session.select_kind(EntityKind::Group).await.unwrap();
        session.open_create().await.unwrap();

        gateway
            .fail_next(
                Operation::Create,
                GatewayError::Rejected {
                    reason: Some("name already taken".into()),
                },
            )
            .await;
        let err = session.submit_create(group("Mentors")).await.unwrap_err();

        assert_eq!(
            err,
            SessionError::Sync(SyncError::validation("name already taken"))
        );
        assert_eq!(session.view().await, ViewState::Creating(EntityKind::Group));
        assert!(session.engine().subscribe(CollectionKey::root(EntityKind::Group)).await.is_empty());
    }

    #[tokio::test]
    async fn successful_submit_returns_to_the_listing() {
        let gateway = backend();
        let session = session(&gateway);
        session.select_kind(EntityKind::Group).await.unwrap();
        session.open_create().await.unwrap();

        let (_, entered) = session.submit_create(group("Mentors")).await.unwrap();

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Group));
        let shown = session.contents().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].origin(), Origin::Authoritative);
    }

    #[tokio::test]
    async fn failed_refetch_after_submit_is_reported() {
        let gateway = backend();
        let session = session(&gateway);
        session.select_kind(EntityKind::Group).await.unwrap();
        session.open_create().await.unwrap();

        gateway
            .fail_next(Operation::Fetch, GatewayError::Network { reason: None })
            .await;
        let (created, entered) = session.submit_create(group("Students")).await.unwrap();

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Group));
        assert!(matches!(
            entered.refresh_error,
            Some(SyncError::NetworkFailure { .. })
        ));
        assert_eq!(session.contents().await, vec![created]);
    }

    #[tokio::test]
    async fn submit_of_another_kind_is_refused() {
        let gateway = backend();
        let session = session(&gateway);
        session.open_create().await.unwrap();

        let err = session.submit_create(group("Mentors")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(gateway.calls(Operation::Create).await, 0);
    }

    #[tokio::test]
    async fn cancel_performs_no_mutation() {
        let gateway = backend();
        let session = session(&gateway);
        session.open_create().await.unwrap();

        let entered = session.cancel().await.unwrap();

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Kahoot));
        assert_eq!(gateway.calls(Operation::Create).await, 0);
    }

    #[tokio::test]
    async fn questions_are_kept_until_leaving_the_kahoot() {
        let gateway = backend();
        let id = gateway.seed(kahoot("Swedish capitals")).await;
        let session = session(&gateway);
        session.start().await;

        let entered = session.select_entity(Identity::Server(id)).await.unwrap();
        assert!(entered.refresh_error.is_none());
        session.add_question(sky()).await.unwrap();

        let shown = session.contents().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].origin(), Origin::Provisional);

        session.back().await.unwrap();
        session.select_entity(Identity::Server(id)).await.unwrap();
        assert!(session.contents().await.is_empty());
        assert_eq!(gateway.row_count().await, 2);
    }

    #[tokio::test]
    async fn questions_need_a_kahoot_detail_view() {
        let gateway = backend();
        let session = session(&gateway);

        let err = session.add_question(sky()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn failed_entry_refresh_keeps_the_new_view_and_old_rows() {
        let gateway = backend();
        gateway.seed(group("Mentors")).await;
        let session = session(&gateway);
        session.select_kind(EntityKind::Group).await.unwrap();
        session.select_kind(EntityKind::User).await.unwrap();

        gateway
            .fail_next(Operation::Fetch, GatewayError::Network { reason: None })
            .await;
        let entered = session.select_kind(EntityKind::Group).await.unwrap();

        assert_eq!(entered.view, ViewState::Listing(EntityKind::Group));
        assert!(matches!(
            entered.refresh_error,
            Some(SyncError::NetworkFailure { .. })
        ));
        assert_eq!(session.contents().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_acts_on_the_displayed_collection() {
        let gateway = backend();
        let id = gateway.seed(kahoot("Private math quiz")).await;
        let session = session(&gateway);
        session.start().await;

        session.delete(Identity::Server(id)).await.unwrap();

        assert!(session.contents().await.is_empty());
        assert_eq!(gateway.row_count().await, 0);
    }

    #[tokio::test]
    async fn deleting_a_question_from_the_detail_view() {
        let gateway = backend();
        let id = gateway.seed(kahoot("Swedish capitals")).await;
        let session = session(&gateway);
        session.start().await;
        session.select_entity(Identity::Server(id)).await.unwrap();
        let question = session.add_question(sky()).await.unwrap().entity;

        session.delete(question.identity()).await.unwrap();

        assert!(session.contents().await.is_empty());
        assert_eq!(gateway.row_count().await, 1);
    }

    #[tokio::test]
    async fn selecting_an_unlisted_record_is_refused() {
        let gateway = backend();
        let session = session(&gateway);
        session.start().await;

        let err = session
            .select_entity(Identity::Server(ServerId::new(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(session.view().await, ViewState::Listing(EntityKind::Kahoot));
    }
}
