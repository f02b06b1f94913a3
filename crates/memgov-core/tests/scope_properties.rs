use memgov_core::{store_key_for, Lane, Space};
use proptest::prelude::*;

fn space() -> impl Strategy<Value = Space> {
    prop_oneof![Just(Space::Session), Just(Space::Project), Just(Space::User)]
}

fn lane() -> impl Strategy<Value = Lane> {
    prop_oneof![Just(Lane::Agent), Just(Lane::Team)]
}

/// Owners and agent ids drawn from an alphabet heavy in separators.
fn component() -> impl Strategy<Value = String> {
    "[a:%3Atem]{0,8}"
}

type Tuple = (Space, Lane, String, Option<String>);

fn key(space: Space, lane: Lane, owner: &str, agent: &Option<String>) -> (String, Tuple) {
    // The team lane has no agent component.
    let agent = if lane == Lane::Team { None } else { agent.clone() };
    (
        store_key_for(space, lane, owner, agent.as_deref()),
        (space, lane, owner.to_string(), agent),
    )
}

proptest! {
    #[test]
    fn distinct_tuples_never_share_a_key(
        a in (space(), lane(), component(), proptest::option::of(component())),
        b in (space(), lane(), component(), proptest::option::of(component())),
    ) {
        let (key_a, tuple_a) = key(a.0, a.1, &a.2, &a.3);
        let (key_b, tuple_b) = key(b.0, b.1, &b.2, &b.3);
        prop_assert_eq!(key_a == key_b, tuple_a == tuple_b);
    }
}
