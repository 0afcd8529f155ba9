//! Log output when the target has drifted from the recorded state.

mod support;

use caskwright_installer::planner::{plan, plan_removal};
use caskwright_installer::state::{InstalledRecords, RecordStore};
use caskwright_installer::test_utils::{Served, font_bundle};
use log::Level;
use logtest::Logger;
use support::Rig;

#[test]
fn removing_a_vanished_file_warns_and_succeeds() {
    let mut logger = Logger::start();
    let rig = Rig::new();
    let bundle = font_bundle("font-drift", "1.0", &["Kept.otf", "Gone.otf"]);
    rig.fetcher.serve(bundle.url, Served::Bytes(bundle.bytes));
    let executor = rig.executor();
    for action in plan(&bundle.manifest, &InstalledRecords::new()) {
        executor.execute(&action).expect("install succeeds");
    }
    std::fs::remove_file(rig.sandbox.layout.fonts_dir.join("Gone.otf")).expect("drift");

    let records = rig.store.inner().records().expect("records");
    for action in plan_removal(bundle.manifest.id(), &records) {
        executor.execute(&action).expect("removal tolerates drift");
    }

    assert!(rig.store.inner().records().expect("records").is_empty());
    assert!(rig.sandbox.all_font_dir_entries().is_empty());
    let mut warned = false;
    while let Some(record) = logger.pop() {
        if record.level() == Level::Warn && record.args().contains("Gone.otf was already missing") {
            warned = true;
        }
    }
    assert!(warned, "expected a warning naming the vanished file");
}
