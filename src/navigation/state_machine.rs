use std::{fmt, time::Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::model::{CollectionKey, Entity, EntityKind, ServerId};

/// Which collection the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// List of every record of a kind.
    Listing(EntityKind),
    /// Create form for a kind.
    Creating(EntityKind),
    /// One record of a kind, selected from its listing.
    Detail(EntityKind, Box<Entity>),
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState::Listing(EntityKind::Kahoot)
    }
}

impl ViewState {
    /// Kind the view is about.
    pub fn kind(&self) -> EntityKind {
        match self {
            ViewState::Listing(kind) | ViewState::Creating(kind) | ViewState::Detail(kind, _) => {
                *kind
            }
        }
    }

    /// Selected record, in a detail view.
    pub fn selected(&self) -> Option<&Entity> {
        match self {
            ViewState::Detail(_, entity) => Some(&**entity),
            _ => None,
        }
    }

    /// Backend id of the Kahoot whose questions are shown, in a Kahoot detail view.
    pub fn question_scope(&self) -> Option<ServerId> {
        match self {
            ViewState::Detail(EntityKind::Kahoot, entity) => entity.server_id(),
            _ => None,
        }
    }

    /// Collection whose contents this view displays, if any.
    pub fn displayed_collection(&self) -> Option<CollectionKey> {
        match self {
            ViewState::Listing(kind) => Some(CollectionKey::root(*kind)),
            ViewState::Creating(_) => None,
            ViewState::Detail(..) => self.question_scope().map(CollectionKey::questions),
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewState::Listing(kind) => write!(f, "listing {kind}"),
            ViewState::Creating(kind) => write!(f, "creating {kind}"),
            ViewState::Detail(kind, entity) => write!(f, "{kind} {}", entity.identity()),
        }
    }
}

/// User intents driving the view state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    /// Pick a kind from the navigation menu.
    SelectKind(EntityKind),
    /// Open the create form of the listed kind.
    OpenCreate,
    /// Leave the create form without creating anything.
    Cancel,
    /// The create form was submitted and the backend accepted it.
    CreateSucceeded,
    /// Open a record from the listing.
    SelectEntity(Box<Entity>),
    /// Leave a detail view.
    Back,
}

/// Error returned when an event cannot be applied from the current view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// View the machine was in when the event was received.
    pub from: ViewState,
    /// The rejected event.
    pub event: NavEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The event is not valid from the current view.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan id does not match the pending plan.
    IdMismatch {
        /// Pending plan id.
        expected: PlanId,
        /// Provided plan id.
        got: PlanId,
    },
    /// Machine version changed since the plan was created.
    VersionMismatch {
        /// Version the plan expected to produce.
        expected: usize,
        /// Version applying it now would produce.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan id does not match the pending plan.
    IdMismatch {
        /// Pending plan id.
        expected: PlanId,
        /// Provided plan id.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// View before the transition.
    pub from: ViewState,
    /// View after the transition.
    pub to: ViewState,
    /// Event that triggered the transition.
    pub event: NavEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// When the plan was created.
    pub pending_since: Instant,
}

/// Copy of the machine's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current view.
    pub view: ViewState,
    /// Incremented on every applied transition.
    pub version: usize,
    /// Target view of the pending transition, if any.
    pending: Option<ViewState>,
}

impl Snapshot {
    /// Target view of the pending transition, if any.
    pub fn pending(&self) -> Option<&ViewState> {
        self.pending.as_ref()
    }
}

/// Navigation between listings, create forms and detail views.
///
/// Starts in `Listing(Kahoot)` and has no terminal state. Transitions are planned,
/// then applied once their work succeeded or aborted when it failed.
#[derive(Debug, Clone, Default)]
pub struct ViewStateMachine {
    view: ViewState,
    version: usize,
    pending: Option<Plan>,
}

impl ViewStateMachine {
    /// Machine showing the Kahoot listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view.
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Create a snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            view: self.view.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Validate `event` against the current view and reserve the transition.
    pub fn plan(&mut self, event: NavEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.view.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition and return the new view.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<ViewState, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.view = plan.to;
        self.version = plan.version_next;

        Ok(self.view.clone())
    }

    /// Drop a planned transition, staying in the current view.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: NavEvent) -> Result<ViewState, InvalidTransition> {
        let next = match (&self.view, event) {
            (_, NavEvent::SelectKind(kind)) if !kind.is_scoped() => ViewState::Listing(kind),
            (ViewState::Listing(kind), NavEvent::OpenCreate) if !kind.is_scoped() => {
                ViewState::Creating(*kind)
            }
            (ViewState::Creating(kind), NavEvent::Cancel | NavEvent::CreateSucceeded) => {
                ViewState::Listing(*kind)
            }
            (ViewState::Listing(kind), NavEvent::SelectEntity(entity))
                if entity.kind() == *kind =>
            {
                ViewState::Detail(*kind, entity)
            }
            (ViewState::Detail(kind, _), NavEvent::Back) => ViewState::Listing(*kind),
            (from, event) => {
                return Err(InvalidTransition {
                    from: from.clone(),
                    event,
                });
            }
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, Kahoot, Payload};

    fn apply(sm: &mut ViewStateMachine, event: NavEvent) -> ViewState {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    fn kahoot(id: i64) -> Box<Entity> {
        Box::new(Entity::authoritative(
            ServerId::new(id),
            Payload::Kahoot(Kahoot {
                title: "History Trivia 101".into(),
                description: None,
                is_private: false,
                language_id: 1,
            }),
        ))
    }

    #[test]
    fn initial_view_is_the_kahoot_listing() {
        let sm = ViewStateMachine::new();
        assert_eq!(sm.view(), &ViewState::Listing(EntityKind::Kahoot));
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn create_round_trip_returns_to_listing() {
        let mut sm = ViewStateMachine::new();
        assert_eq!(
            apply(&mut sm, NavEvent::SelectKind(EntityKind::User)),
            ViewState::Listing(EntityKind::User)
        );
        assert_eq!(
            apply(&mut sm, NavEvent::OpenCreate),
            ViewState::Creating(EntityKind::User)
        );
        assert_eq!(
            apply(&mut sm, NavEvent::CreateSucceeded),
            ViewState::Listing(EntityKind::User)
        );
        apply(&mut sm, NavEvent::OpenCreate);
        assert_eq!(
            apply(&mut sm, NavEvent::Cancel),
            ViewState::Listing(EntityKind::User)
        );
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn detail_and_back_clear_the_selection() {
        let mut sm = ViewStateMachine::new();
        let detail = apply(&mut sm, NavEvent::SelectEntity(kahoot(7)));
        assert_eq!(detail.question_scope(), Some(ServerId::new(7)));
        assert_eq!(
            detail.displayed_collection(),
            Some(CollectionKey::questions(ServerId::new(7)))
        );

        let back = apply(&mut sm, NavEvent::Back);
        assert_eq!(back, ViewState::Listing(EntityKind::Kahoot));
        assert!(back.selected().is_none());
    }

    #[test]
    fn selecting_a_record_of_another_kind_is_rejected() {
        let mut sm = ViewStateMachine::new();
        let group = Box::new(Entity::authoritative(
            ServerId::new(1),
            Payload::Group(Group {
                name: "Mentors".into(),
                description: None,
            }),
        ));

        let err = sm.plan(NavEvent::SelectEntity(group)).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, ViewState::Listing(EntityKind::Kahoot));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn questions_have_no_listing_of_their_own() {
        let mut sm = ViewStateMachine::new();
        assert!(matches!(
            sm.plan(NavEvent::SelectKind(EntityKind::Question)),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn back_is_only_valid_from_a_detail_view() {
        let mut sm = ViewStateMachine::new();
        assert!(matches!(
            sm.plan(NavEvent::Back),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn second_plan_is_refused_while_one_is_pending() {
        let mut sm = ViewStateMachine::new();
        let plan = sm.plan(NavEvent::OpenCreate).unwrap();
        assert_eq!(
            sm.plan(NavEvent::OpenCreate).unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(
            sm.snapshot().pending(),
            Some(&ViewState::Creating(EntityKind::Kahoot))
        );
        sm.abort(plan.id).unwrap();
        assert_eq!(sm.view(), &ViewState::Listing(EntityKind::Kahoot));
        assert!(sm.snapshot().pending().is_none());
    }

    #[test]
    fn apply_with_a_foreign_plan_id_keeps_the_pending_plan() {
        let mut sm = ViewStateMachine::new();
        let plan = sm.plan(NavEvent::OpenCreate).unwrap();

        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert!(matches!(
            sm.abort(Uuid::new_v4()),
            Err(AbortError::IdMismatch { .. })
        ));

        assert_eq!(sm.apply(plan.id).unwrap(), ViewState::Creating(EntityKind::Kahoot));
        assert_eq!(sm.apply(plan.id).unwrap_err(), ApplyError::NoPending);
    }
}
