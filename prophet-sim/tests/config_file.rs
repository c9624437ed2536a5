use std::io::Write;

use prophet_core::{ForwardStrategy, QueuePolicy};
use prophet_sim::config;

#[test]
fn loads_scenario_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(
        f,
        r#"
nodes = ["dtn://a", "dtn://b", "dtn://c"]
quota = 4096
duration = 900

[prophet]
hello_interval = 10
forward_strategy = "GRTR_SORT"
queue_policy = "MOFO"

[[contacts]]
a = "dtn://a"
b = "dtn://b"
start = 0
end = 120

[[messages]]
from = "dtn://a"
to = "dtn://c"
at = 5
"#
    )
    .unwrap();

    let c = config::load_file(f.path()).unwrap();
    assert_eq!(c.nodes.len(), 3);
    assert_eq!(c.quota, 4096);
    assert_eq!(c.duration, 900);
    assert_eq!(c.prophet.hello_interval, 10);
    assert_eq!(c.prophet.forward_strategy, ForwardStrategy::GrtrSort);
    assert_eq!(c.prophet.queue_policy, QueuePolicy::Mofo);
    assert_eq!(c.contacts[0].end, 120);
    assert_eq!(c.messages[0].size, 1024);
    assert_eq!(c.messages[0].lifetime, 3600);
    assert!(c.validate().is_ok());
}

#[test]
fn bad_file_reports_path() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "nodes = 3").unwrap();
    let err = config::load_file(f.path()).unwrap_err();
    assert!(format!("{err:#}").contains(&f.path().display().to_string()));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(config::load_file(&dir.path().join("nope.toml")).is_err());
}
