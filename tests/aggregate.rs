mod common;

use common::{id, FakeTransport};
use crestron_panel::{JoinKind, JoinValue, MockSnapshot, Panel};
use std::sync::Arc;

const ALL_MICS: u32 = 20;
const BOARDROOM: u32 = 21;
const TRAINING: u32 = 22;
const WIRELESS: u32 = 23;

fn live_panel() -> (Arc<FakeTransport>, Panel) {
    let fake = FakeTransport::new();
    let panel = Panel::with_transport(fake.clone());
    (fake, panel)
}

fn constituent_ids(n: u32) -> Vec<u32> {
    (0..n).map(|i| 100 + i).collect()
}

fn digital_publishes(fake: &FakeTransport, raw: u32) -> Vec<bool> {
    fake.published_to(JoinKind::Digital, id(raw))
        .into_iter()
        .map(|value| value.as_bool())
        .collect()
}

#[test]
fn toggle_from_mixed_state_writes_only_stragglers() {
    let (fake, panel) = live_panel();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING), id(WIRELESS)])
        .unwrap();

    fake.push_digital(id(BOARDROOM), true);
    fake.push_digital(id(WIRELESS), true);
    assert!(!mics.value());
    assert_eq!(mics.active_count(), 2);
    assert!(fake.published().is_empty());

    assert!(mics.toggle());
    assert_eq!(
        fake.published(),
        vec![
            (JoinKind::Digital, id(ALL_MICS), JoinValue::Digital(true)),
            (JoinKind::Digital, id(TRAINING), JoinValue::Digital(true)),
        ]
    );
    assert!(mics.constituents().iter().all(|mic| mic.value()));
}

#[test]
fn toggle_off_from_all_on_writes_every_constituent() {
    let (fake, panel) = live_panel();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING), id(WIRELESS)])
        .unwrap();
    for raw in [BOARDROOM, TRAINING, WIRELESS] {
        fake.push_digital(id(raw), true);
    }
    assert!(mics.value());
    fake.clear_published();

    assert!(!mics.toggle());
    assert_eq!(digital_publishes(&fake, ALL_MICS), vec![false]);
    for raw in [BOARDROOM, TRAINING, WIRELESS] {
        assert_eq!(digital_publishes(&fake, raw), vec![false]);
    }
    assert_eq!(mics.active_count(), 0);
}

#[test]
fn toggle_writes_exactly_the_differing_constituents() {
    for n in 1..=4u32 {
        for mask in 0..(1u32 << n) {
            let (fake, panel) = live_panel();
            let ids = constituent_ids(n);
            let mics = panel
                .aggregate(id(ALL_MICS), ids.iter().map(|raw| id(*raw)))
                .unwrap();
            for (bit, raw) in ids.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    fake.push_digital(id(*raw), true);
                }
            }
            fake.clear_published();

            let on = mask.count_ones();
            let target = mics.toggle();
            let expected_writes = if target { n - on } else { on };

            let constituent_writes = fake
                .published()
                .iter()
                .filter(|(_, join, _)| *join != id(ALL_MICS))
                .count() as u32;
            assert_eq!(constituent_writes, expected_writes, "n={} mask={:b}", n, mask);
            assert_eq!(digital_publishes(&fake, ALL_MICS), vec![target]);
            assert!(mics.constituents().iter().all(|mic| mic.value() == target));
        }
    }
}

#[test]
fn aggregate_tracks_and_of_constituents() {
    for n in 1..=4u32 {
        let (fake, panel) = live_panel();
        let ids = constituent_ids(n);
        let mics = panel
            .aggregate(id(ALL_MICS), ids.iter().map(|raw| id(*raw)))
            .unwrap();

        // Walk every assignment, changing one join at a time from the bus
        for mask in 0..(1u32 << n) {
            let gray = mask ^ (mask >> 1);
            for (bit, raw) in ids.iter().enumerate() {
                fake.push_digital(id(*raw), gray & (1 << bit) != 0);
            }
            let all_on = gray == (1 << n) - 1;
            assert_eq!(mics.value(), all_on, "n={} assignment={:b}", n, gray);
        }
    }
}

#[test]
fn aggregate_is_published_only_when_it_changes() {
    let (fake, panel) = live_panel();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
        .unwrap();

    fake.push_digital(id(BOARDROOM), true);
    fake.push_digital(id(BOARDROOM), true);
    assert!(digital_publishes(&fake, ALL_MICS).is_empty());

    fake.push_digital(id(TRAINING), true);
    fake.push_digital(id(TRAINING), true);
    assert_eq!(digital_publishes(&fake, ALL_MICS), vec![true]);

    fake.push_digital(id(BOARDROOM), false);
    assert_eq!(digital_publishes(&fake, ALL_MICS), vec![true, false]);
    assert!(!mics.value());
}

#[test]
fn stale_echo_after_toggle_is_followed() {
    let (fake, panel) = live_panel();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
        .unwrap();

    mics.toggle();
    assert!(mics.value());

    // The processor refuses one microphone
    fake.push_digital(id(TRAINING), false);
    assert!(!mics.value());
    assert_eq!(digital_publishes(&fake, ALL_MICS), vec![true, false]);
}

#[test]
fn bus_update_to_aggregate_is_pulled_back() {
    let (fake, panel) = live_panel();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
        .unwrap();

    fake.push_digital(id(ALL_MICS), true);
    assert!(!mics.value());
    assert_eq!(mics.active_count(), 0);
    assert_eq!(
        fake.published(),
        vec![(JoinKind::Digital, id(ALL_MICS), JoinValue::Digital(false))]
    );

    // A consistent report needs no correction
    fake.clear_published();
    fake.push_digital(id(ALL_MICS), false);
    assert!(fake.published().is_empty());
}

#[test]
fn offline_write_to_aggregate_is_pulled_back() {
    let panel = Panel::offline();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
        .unwrap();
    let other_view = panel.digital(id(ALL_MICS));

    other_view.set_digital(true);
    assert!(!mics.value());
    assert!(!other_view.value());
    assert_eq!(mics.active_count(), 0);
}

#[test]
fn concurrent_bus_updates_settle() {
    for _ in 0..500 {
        let (fake, panel) = live_panel();
        let mics = panel
            .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
            .unwrap();

        std::thread::scope(|scope| {
            for raw in [BOARDROOM, TRAINING] {
                let fake = &fake;
                scope.spawn(move || {
                    fake.push_digital(id(raw), true);
                    fake.push_digital(id(raw), false);
                    fake.push_digital(id(raw), true);
                });
            }
        });

        let all_on = mics.constituents().iter().all(|mic| mic.value());
        assert!(all_on);
        assert_eq!(mics.value(), all_on);
    }
}

#[test]
fn offline_aggregate_settles_seeded_state() {
    let snapshot = MockSnapshot::from_json_str(
        r#"{"digital": {"20": true, "21": true, "22": true, "23": false}}"#,
    )
    .unwrap();
    let panel = Panel::offline_with(&snapshot);
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING), id(WIRELESS)])
        .unwrap();
    assert!(!mics.value());

    // Other views of the same joins see the rule's writes
    let wireless = panel.digital(id(WIRELESS));
    assert!(mics.toggle());
    assert!(wireless.value());

    wireless.set_digital(false);
    assert!(!mics.value());
    assert_eq!(mics.active_count(), 2);
}

#[test]
fn constituents_are_reachable_by_id() {
    let panel = Panel::offline();
    let mics = panel
        .aggregate(id(ALL_MICS), [id(BOARDROOM), id(TRAINING)])
        .unwrap();

    mics.constituent(id(BOARDROOM)).unwrap().toggle();
    assert_eq!(mics.active_count(), 1);
    mics.constituent(id(TRAINING)).unwrap().toggle();
    assert!(mics.value());
    assert!(mics.constituent(id(WIRELESS)).is_none());
}
