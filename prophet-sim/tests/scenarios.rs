use prophet_core::{EncounterState, ProphetParams};
use prophet_sim::config::{ContactConfig, MessageConfig};
use prophet_sim::{logging, Config, Simulation};

fn contact(a: &str, b: &str, start: u64, end: u64) -> ContactConfig {
    ContactConfig {
        a: a.into(),
        b: b.into(),
        start,
        end,
    }
}

fn message(from: &str, to: &str, at: u64) -> MessageConfig {
    MessageConfig {
        from: from.into(),
        to: to.into(),
        at,
        size: 200,
        lifetime: 3600,
    }
}

fn nodes(eids: &[&str]) -> Vec<String> {
    eids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn handshake_reaches_wait_info() {
    logging::init_for_tests();
    let config = Config {
        nodes: nodes(&["dtn://a", "dtn://b"]),
        contacts: vec![contact("dtn://a", "dtn://b", 1, 100)],
        duration: 100,
        ..Config::default()
    };
    let mut sim = Simulation::new(&config).unwrap();
    sim.run_to(1000);

    let a = sim.node("dtn://a").unwrap();
    let b = sim.node("dtn://b").unwrap();
    assert_eq!(a.encounter_state("dtn://b"), Some(EncounterState::WaitInfo));
    assert_eq!(b.encounter_state("dtn://a"), Some(EncounterState::WaitInfo));
    assert!((a.nodes().p_value("dtn://b") - 0.75).abs() < 1e-9);
    assert!((b.nodes().p_value("dtn://a") - 0.75).abs() < 1e-9);
}

#[test]
fn contact_loss_closes_sessions() {
    let config = Config {
        nodes: nodes(&["dtn://a", "dtn://b"]),
        contacts: vec![contact("dtn://a", "dtn://b", 1, 10)],
        duration: 60,
        ..Config::default()
    };
    let mut sim = Simulation::new(&config).unwrap();
    sim.run_to(10_000);
    assert!(sim.node("dtn://a").unwrap().encounter("dtn://b").is_none());
    assert!(sim.node("dtn://b").unwrap().encounter("dtn://a").is_none());
    // the route outlives the contact
    assert!(sim.node("dtn://a").unwrap().nodes().p_value("dtn://b") > 0.7);
}

#[test]
fn relay_carries_bundle_across_two_contacts() {
    logging::init_for_tests();
    // b has met c, so a hands its bundle for c to b; slow aging keeps
    // the routes alive between contacts
    let config = Config {
        prophet: ProphetParams {
            kappa: 10_000,
            ..ProphetParams::default()
        },
        nodes: nodes(&["dtn://a", "dtn://b", "dtn://c"]),
        contacts: vec![
            contact("dtn://b", "dtn://c", 0, 30),
            contact("dtn://a", "dtn://b", 60, 120),
            contact("dtn://b", "dtn://c", 180, 240),
        ],
        messages: vec![message("dtn://a", "dtn://c", 50)],
        duration: 300,
        ..Config::default()
    };
    let mut sim = Simulation::new(&config).unwrap();

    sim.run_to(120_000);
    let b = sim.node("dtn://b").unwrap();
    assert_eq!(b.core().stored().len(), 1);
    assert_eq!(sim.report().delivered, 0);

    let report = sim.run();
    assert_eq!(report.injected, 1);
    assert_eq!(report.delivered, 1);
    assert!(report.mean_delay_secs() >= 130.0);
    // c learned of a through b
    assert!(sim.node("dtn://c").unwrap().nodes().p_value("dtn://a") > 0.0);
}
