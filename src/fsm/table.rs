//! # State and transition tables.
//!
//! Tables are plain slices built once (usually as `static`s) and borrowed by an
//! [`Fsm`](crate::Fsm). Callbacks are `fn` pointers over an explicit context type `C`
//! owned by the machine, so a table never captures anything.
//!
//! ## Priority
//! Transitions are scanned in slice order and the first match wins. A wildcard
//! rule (`from == StateId::ANY`) placed before a state-specific rule for the same
//! event hides it; [`FsmConfig::shadowed`] reports such pairs.
//!
//! ## Example
//! ```rust
//! use nodevisor::{EventId, State, StateId, Transition};
//!
//! const IDLE: StateId = StateId(0);
//! const BUSY: StateId = StateId(1);
//!
//! fn count(ctx: &mut u32) { *ctx += 1; }
//!
//! static STATES: [State<u32>; 2] = [
//!     State::new(IDLE, "IDLE"),
//!     State::new(BUSY, "BUSY").on_enter(count),
//! ];
//! static TRANSITIONS: [Transition<u32>; 1] = [
//!     Transition::new(IDLE, EventId(0x1000), BUSY),
//! ];
//! # let _ = (&STATES, &TRANSITIONS);
//! ```

use std::fmt;

use crate::events::EventId;

/// 16-bit state identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u16);

impl StateId {
    /// Wildcard source state in a transition: matches any current state.
    pub const ANY: StateId = StateId(0xFFFE);
    /// "No state": the previous state of a machine that never transitioned.
    pub const INVALID: StateId = StateId(0xFFFF);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StateId::ANY => f.write_str("ANY"),
            StateId::INVALID => f.write_str("INVALID"),
            StateId(raw) => write!(f, "{raw}"),
        }
    }
}

/// State lifecycle callback.
pub type StateFn<C> = fn(&mut C);
/// Transition guard: `(context, current state, event) -> allowed`.
pub type GuardFn<C> = fn(&C, StateId, EventId) -> bool;
/// Transition action, run between the exit and enter callbacks.
pub type ActionFn<C> = fn(&mut C, EventId);

/// One entry of a state table.
pub struct State<C> {
    /// State id (unique within the table).
    pub id: StateId,
    /// Human-readable name.
    pub name: &'static str,
    /// Invoked when the state becomes current (also by `start`).
    pub on_enter: Option<StateFn<C>>,
    /// Invoked when the state stops being current (also by `stop`).
    pub on_exit: Option<StateFn<C>>,
    /// Invoked by [`Fsm::run`](crate::Fsm::run) while the state is current.
    pub on_run: Option<StateFn<C>>,
}

impl<C> State<C> {
    /// Creates a state without callbacks.
    pub const fn new(id: StateId, name: &'static str) -> Self {
        Self {
            id,
            name,
            on_enter: None,
            on_exit: None,
            on_run: None,
        }
    }

    /// Sets the enter callback.
    pub const fn on_enter(mut self, f: StateFn<C>) -> Self {
        self.on_enter = Some(f);
        self
    }

    /// Sets the exit callback.
    pub const fn on_exit(mut self, f: StateFn<C>) -> Self {
        self.on_exit = Some(f);
        self
    }

    /// Sets the periodic callback.
    pub const fn on_run(mut self, f: StateFn<C>) -> Self {
        self.on_run = Some(f);
        self
    }
}

impl<C> fmt::Debug for State<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One entry of a transition table.
pub struct Transition<C> {
    /// Source state, or [`StateId::ANY`].
    pub from: StateId,
    /// Triggering event (exact match).
    pub event: EventId,
    /// Target state.
    pub to: StateId,
    /// Optional guard; `false` rejects the transition.
    pub guard: Option<GuardFn<C>>,
    /// Optional action.
    pub action: Option<ActionFn<C>>,
}

impl<C> Transition<C> {
    /// Creates an unguarded transition without action.
    pub const fn new(from: StateId, event: EventId, to: StateId) -> Self {
        Self {
            from,
            event,
            to,
            guard: None,
            action: None,
        }
    }

    /// Sets the guard.
    pub const fn guard(mut self, g: GuardFn<C>) -> Self {
        self.guard = Some(g);
        self
    }

    /// Sets the action.
    pub const fn action(mut self, a: ActionFn<C>) -> Self {
        self.action = Some(a);
        self
    }

    /// `true` if this rule is a candidate for `event` in state `current`.
    #[inline]
    pub fn matches(&self, current: StateId, event: EventId) -> bool {
        self.event == event && (self.from == current || self.from == StateId::ANY)
    }

    /// `true` if every event this rule is a candidate for, `other` is too.
    fn covered_by(&self, other: &Transition<C>) -> bool {
        self.event == other.event && (other.from == StateId::ANY || other.from == self.from)
    }
}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

/// Machine configuration: tables (borrowed), initial state and owned context.
pub struct FsmConfig<'a, C> {
    /// Machine name used in logs and errors.
    pub name: &'static str,
    /// State table; must be non-empty.
    pub states: &'a [State<C>],
    /// Transition table, in priority order.
    pub transitions: &'a [Transition<C>],
    /// State entered by `start`.
    pub initial: StateId,
    /// User context passed to every callback.
    pub context: C,
}

/// A transition that can never fire because an earlier rule always claims its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shadowed {
    /// Index of the unreachable transition.
    pub index: usize,
    /// Index of the earlier transition hiding it.
    pub by: usize,
}

impl<C> FsmConfig<'_, C> {
    /// Lists transitions hidden by an earlier rule for the same event whose source
    /// is the same state or [`StateId::ANY`].
    ///
    /// Guarded earlier rules shadow too: a rejecting guard ends the scan with
    /// `NotAllowed`, it never falls through to later rules.
    pub fn shadowed(&self) -> Vec<Shadowed> {
        let mut out = Vec::new();
        for (index, later) in self.transitions.iter().enumerate() {
            let hit = self.transitions[..index]
                .iter()
                .position(|earlier| later.covered_by(earlier));
            if let Some(by) = hit {
                out.push(Shadowed { index, by });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const X: EventId = EventId(0x1000);

    fn never(_: &(), _: StateId, _: EventId) -> bool {
        false
    }

    fn config<'a>(transitions: &'a [Transition<()>], states: &'a [State<()>]) -> FsmConfig<'a, ()> {
        FsmConfig {
            name: "t",
            states,
            transitions,
            initial: A,
            context: (),
        }
    }

    #[test]
    fn test_specific_before_wildcard_is_not_shadowed() {
        let states = [State::new(A, "A"), State::new(B, "B")];
        let transitions = [Transition::new(A, X, B), Transition::new(StateId::ANY, X, A)];
        assert!(config(&transitions, &states).shadowed().is_empty());
    }

    #[test]
    fn test_wildcard_before_specific_is_reported() {
        let states = [State::new(A, "A"), State::new(B, "B")];
        let transitions = [Transition::new(StateId::ANY, X, A), Transition::new(A, X, B)];
        assert_eq!(
            config(&transitions, &states).shadowed(),
            vec![Shadowed { index: 1, by: 0 }]
        );
    }

    #[test]
    fn test_guarded_rule_shadows_later_rules() {
        let states = [State::new(A, "A"), State::new(B, "B")];
        let transitions = [
            Transition::new(StateId::ANY, X, A).guard(never),
            Transition::new(A, X, B),
        ];
        assert_eq!(
            config(&transitions, &states).shadowed(),
            vec![Shadowed { index: 1, by: 0 }]
        );
    }

    #[test]
    fn test_guarded_rule_for_other_state_does_not_shadow() {
        let states = [State::new(A, "A"), State::new(B, "B")];
        let transitions = [Transition::new(B, X, A).guard(never), Transition::new(A, X, B)];
        assert!(config(&transitions, &states).shadowed().is_empty());
    }

    #[test]
    fn test_state_id_display() {
        assert_eq!(StateId::ANY.to_string(), "ANY");
        assert_eq!(StateId(3).to_string(), "3");
    }
}
