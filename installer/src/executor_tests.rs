//! Unit tests for the executor.
//!
//! Happy paths run against real files in a sandbox with an in-memory
//! fetcher; failure paths inject errors through doubles and mocks.

use super::*;
use crate::artifact::extract::{MockArchiveExpander, StandardExpander};
use crate::artifact::fetch::MockArtifactFetcher;
use crate::hooks::NoopHook;
use crate::manifest::{ArchiveKind, ResourceDeclaration, ResourceKind};
use crate::state::StateStore;
use crate::test_utils::{
    FlakyStore, RecordingHook, Sandbox, Served, StaticFetcher, font_bundle, manifest_with,
    zip_bytes,
};
use rstest::{fixture, rstest};
use std::fs;

const FONTS: &[&str] = &["LMRoman10-Regular.otf", "LMMono10-Italic.otf"];

struct Harness {
    sandbox: Sandbox,
    fetcher: StaticFetcher,
    store: FlakyStore,
    hook: RecordingHook,
}

impl Harness {
    fn executor(&self) -> Executor<'_> {
        self.executor_with(&StandardExpander)
    }

    fn executor_with<'a>(&'a self, expander: &'a dyn ArchiveExpander) -> Executor<'a> {
        Executor::new(
            Collaborators {
                fetcher: &self.fetcher,
                expander,
                store: &self.store,
                hook: &self.hook,
            },
            self.sandbox.staging.clone(),
            self.sandbox.layout.clone(),
        )
        .with_retry(RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        })
    }

    fn publish(&self, version: &str, fonts: &[&str]) -> Manifest {
        let bundle = font_bundle("font-latin-modern", version, fonts);
        self.fetcher.serve(bundle.url, Served::Bytes(bundle.bytes));
        bundle.manifest
    }

    /// Install a bundle under another identifier that reuses a font name.
    fn install_other(&self, fonts: &[&str]) {
        let bundle = font_bundle("font-other", "9.9", fonts);
        self.fetcher.serve(bundle.url, Served::Bytes(bundle.bytes));
        self.executor()
            .execute(&install(&bundle.manifest))
            .expect("install other bundle");
    }

    fn font(&self, name: &str) -> String {
        fs::read_to_string(self.sandbox.layout.fonts_dir.join(name)).expect("read font")
    }

    fn record(&self) -> Option<InstalledRecord> {
        self.store
            .get(&ManifestId::try_from("font-latin-modern").expect("valid id"))
            .expect("read record")
    }
}

#[fixture]
fn harness() -> Harness {
    let sandbox = Sandbox::new();
    let store = FlakyStore::new(sandbox.store());
    Harness {
        sandbox,
        fetcher: StaticFetcher::new(),
        store,
        hook: RecordingHook::new(),
    }
}

fn install(manifest: &Manifest) -> Action {
    Action::Install {
        manifest: manifest.clone(),
        version: manifest.version().clone(),
    }
}

fn upgrade(manifest: &Manifest, from: &str) -> Action {
    Action::Upgrade {
        manifest: manifest.clone(),
        from: from.try_into().expect("valid version"),
        to: manifest.version().clone(),
    }
}

fn removal(version: &str) -> Action {
    Action::Remove {
        id: ManifestId::try_from("font-latin-modern").expect("valid id"),
        version: version.try_into().expect("valid version"),
    }
}

#[rstest]
fn install_places_files_and_records_them(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);

    let report = harness
        .executor()
        .execute(&install(&manifest))
        .expect("install succeeds");

    assert_eq!(report.outcome, Outcome::Installed);
    assert_eq!(
        harness.sandbox.installed_fonts(),
        ["LMMono10-Italic.otf", "LMRoman10-Regular.otf"]
    );
    let record = harness.record().expect("record written");
    assert_eq!(record.version.as_str(), "2.004");
    assert_eq!(record.files, report.files);
    assert_eq!(record.files.len(), 2);
    assert!(report.hook_warning.is_none());
    assert_eq!(
        harness.hook.calls(),
        vec![vec![harness.sandbox.layout.fonts_dir.clone()]]
    );
}

#[rstest]
fn staged_artifact_is_reused(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let executor = harness.executor();

    executor.execute(&install(&manifest)).expect("install");
    executor.execute(&removal("2.004")).expect("remove");
    executor.execute(&install(&manifest)).expect("reinstall");

    assert_eq!(harness.fetcher.calls().len(), 1);
}

#[rstest]
fn digest_mismatch_places_nothing(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let url = manifest.artifacts()[0]
        .url_for(manifest.version())
        .expect("url");
    harness
        .fetcher
        .serve(url, Served::Bytes(b"tampered".to_vec()));

    let err = harness
        .executor()
        .execute(&install(&manifest))
        .expect_err("mismatch fails");

    assert_eq!(err.kind(), FailureKind::DigestMismatch);
    assert_eq!(err.stage, Stage::Verify);
    assert!(harness.sandbox.installed_fonts().is_empty());
    assert!(harness.record().is_none());
}

#[rstest]
#[case::offline(Served::Offline, FailureKind::Network)]
#[case::not_found(Served::Status(404), FailureKind::HttpStatus)]
fn fetch_failures_are_classified(
    harness: Harness,
    #[case] response: Served,
    #[case] expected: FailureKind,
) {
    let manifest = harness.publish("2.004", FONTS);
    let url = manifest.artifacts()[0]
        .url_for(manifest.version())
        .expect("url");
    harness.fetcher.serve(url, response);

    let err = harness
        .executor()
        .execute(&install(&manifest))
        .expect_err("fetch fails");

    assert_eq!(err.kind(), expected);
    assert_eq!(err.stage, Stage::Fetch);
    assert_eq!(err.id.as_str(), "font-latin-modern");
}

#[rstest]
fn missing_resource_fails_before_placement(harness: Harness) {
    let bytes = zip_bytes(&[("otf/LMRoman10-Regular.otf", b"roman".as_slice())]);
    let manifest = manifest_with(
        "font-latin-modern",
        "2.004",
        "https://downloads.example.test/lm.zip",
        &bytes,
        ArchiveKind::Zip,
        vec![
            ResourceDeclaration::font("LMRoman10-Regular.otf").expect("valid"),
            ResourceDeclaration::font("LMSans10-Bold.otf").expect("valid"),
        ],
    );
    harness
        .fetcher
        .serve("https://downloads.example.test/lm.zip", Served::Bytes(bytes));

    let err = harness
        .executor()
        .execute(&install(&manifest))
        .expect_err("missing resource");

    assert_eq!(err.kind(), FailureKind::MissingResource);
    assert_eq!(err.stage, Stage::Resolve);
    assert!(harness.sandbox.installed_fonts().is_empty());
}

#[rstest]
fn traversal_from_expander_is_fatal(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let mut expander = MockArchiveExpander::new();
    expander.expect_expand().returning(|_, _, _| {
        Err(ExtractionError::PathTraversal {
            path: "../../evil.otf".to_owned(),
        })
    });

    let err = harness
        .executor_with(&expander)
        .execute(&install(&manifest))
        .expect_err("traversal");

    assert_eq!(err.kind(), FailureKind::ArchiveTraversal);
    assert_eq!(err.stage, Stage::Expand);
}

#[rstest]
fn foreign_file_conflicts_and_rolls_back(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let fonts_dir = &harness.sandbox.layout.fonts_dir;
    fs::create_dir_all(fonts_dir).expect("fonts dir");
    fs::write(fonts_dir.join("LMRoman10-Regular.otf"), "foreign").expect("seed");

    let err = harness
        .executor()
        .execute(&install(&manifest))
        .expect_err("conflict");

    assert_eq!(err.kind(), FailureKind::Conflict);
    assert_eq!(
        harness.sandbox.all_font_dir_entries(),
        ["LMRoman10-Regular.otf"]
    );
    assert_eq!(
        fs::read_to_string(fonts_dir.join("LMRoman10-Regular.otf")).expect("read"),
        "foreign"
    );
}

#[rstest]
fn upgrade_replaces_files_and_record(harness: Harness) {
    let old = harness.publish("2.003", &["LMRoman10-Regular.otf", "LMOld.otf"]);
    let executor = harness.executor();
    executor.execute(&install(&old)).expect("install old");

    let new = harness.publish("2.004", FONTS);
    let report = executor
        .execute(&upgrade(&new, "2.003"))
        .expect("upgrade");

    assert_eq!(report.outcome, Outcome::Upgraded);
    assert_eq!(
        harness.sandbox.all_font_dir_entries(),
        ["LMMono10-Italic.otf", "LMRoman10-Regular.otf"]
    );
    let roman = harness.sandbox.layout.fonts_dir.join("LMRoman10-Regular.otf");
    assert_eq!(
        fs::read_to_string(roman).expect("read"),
        "LMRoman10-Regular.otf 2.004"
    );
    assert_eq!(harness.record().expect("record").version.as_str(), "2.004");
}

#[rstest]
fn record_failure_rolls_back_upgrade(harness: Harness) {
    let old = harness.publish("2.003", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&old)).expect("install old");
    let before = harness.sandbox.all_font_dir_entries();

    let new = harness.publish("2.004", FONTS);
    harness.store.fail_puts(3);
    let err = executor
        .execute(&upgrade(&new, "2.003"))
        .expect_err("record write fails");

    assert_eq!(err.kind(), FailureKind::Persistence);
    assert_eq!(err.stage, Stage::Record);
    assert_eq!(harness.store.put_attempts(), 4);
    assert_eq!(harness.sandbox.all_font_dir_entries(), before);
    let roman = harness.sandbox.layout.fonts_dir.join("LMRoman10-Regular.otf");
    assert_eq!(
        fs::read_to_string(roman).expect("read"),
        "LMRoman10-Regular.otf 2.003"
    );
    assert_eq!(harness.record().expect("record").version.as_str(), "2.003");
}

#[rstest]
fn transient_record_failure_is_retried(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    harness.store.fail_puts(2);

    harness
        .executor()
        .execute(&install(&manifest))
        .expect("third attempt succeeds");

    assert_eq!(harness.store.put_attempts(), 3);
    assert!(harness.record().is_some());
}

#[rstest]
fn hook_failure_is_a_warning(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let hook = RecordingHook::failing();
    let executor = Executor::new(
        Collaborators {
            fetcher: &harness.fetcher,
            expander: &StandardExpander,
            store: &harness.store,
            hook: &hook,
        },
        harness.sandbox.staging.clone(),
        harness.sandbox.layout.clone(),
    );

    let report = executor
        .execute(&install(&manifest))
        .expect("install still succeeds");

    assert!(report.hook_warning.is_some_and(|w| w.contains("cache locked")));
    assert!(harness.record().is_some());
}

#[rstest]
fn remove_deletes_files_and_record(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&manifest)).expect("install");

    let report = executor.execute(&removal("2.004")).expect("remove");

    assert_eq!(report.outcome, Outcome::Removed);
    assert_eq!(report.files.len(), 2);
    assert!(harness.sandbox.all_font_dir_entries().is_empty());
    assert!(harness.record().is_none());
}

#[rstest]
fn remove_skips_vanished_files_with_warning(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&manifest)).expect("install");
    fs::remove_file(harness.sandbox.layout.fonts_dir.join("LMMono10-Italic.otf"))
        .expect("drift");

    executor
        .execute(&removal("2.004"))
        .expect("remove tolerates drift");

    assert!(harness.sandbox.installed_fonts().is_empty());
    assert!(harness.record().is_none());
}

#[rstest]
fn upgrade_refuses_file_now_recorded_by_another_manifest(harness: Harness) {
    let old = harness.publish("2.003", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&old)).expect("install old");
    fs::remove_file(harness.sandbox.layout.fonts_dir.join("LMRoman10-Regular.otf"))
        .expect("drift");
    harness.install_other(&["LMRoman10-Regular.otf"]);

    let new = harness.publish("2.004", FONTS);
    let err = executor
        .execute(&upgrade(&new, "2.003"))
        .expect_err("shared file blocks the upgrade");

    assert_eq!(err.kind(), FailureKind::Conflict);
    assert_eq!(err.stage, Stage::Place);
    assert_eq!(harness.font("LMRoman10-Regular.otf"), "LMRoman10-Regular.otf 9.9");
    assert_eq!(harness.font("LMMono10-Italic.otf"), "LMMono10-Italic.otf 2.003");
    assert_eq!(harness.record().expect("record").version.as_str(), "2.003");
    assert_eq!(
        harness.sandbox.all_font_dir_entries(),
        ["LMMono10-Italic.otf", "LMRoman10-Regular.otf"]
    );
}

#[rstest]
fn remove_leaves_files_recorded_by_another_manifest(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&manifest)).expect("install");
    fs::remove_file(harness.sandbox.layout.fonts_dir.join("LMRoman10-Regular.otf"))
        .expect("drift");
    harness.install_other(&["LMRoman10-Regular.otf"]);

    let report = executor.execute(&removal("2.004")).expect("remove");

    assert_eq!(
        report.files,
        vec![harness.sandbox.layout.fonts_dir.join("LMMono10-Italic.otf")]
    );
    assert_eq!(harness.sandbox.installed_fonts(), ["LMRoman10-Regular.otf"]);
    assert_eq!(harness.font("LMRoman10-Regular.otf"), "LMRoman10-Regular.otf 9.9");
    assert!(harness.record().is_none());
    let other = harness
        .store
        .get(&ManifestId::try_from("font-other").expect("valid id"))
        .expect("read record")
        .expect("other record kept");
    assert_eq!(other.files.len(), 1);
}

#[rstest]
fn removing_absent_record_is_a_no_op(harness: Harness) {
    let report = harness
        .executor()
        .execute(&removal("2.004"))
        .expect("no-op");
    assert!(report.files.is_empty());
    assert!(harness.hook.calls().is_empty());
}

#[rstest]
fn failed_record_delete_keeps_record(harness: Harness) {
    let manifest = harness.publish("2.004", FONTS);
    let executor = harness.executor();
    executor.execute(&install(&manifest)).expect("install");
    harness.store.fail_deletes(3);

    let err = executor
        .execute(&removal("2.004"))
        .expect_err("delete fails");

    assert_eq!(err.kind(), FailureKind::Persistence);
    assert!(harness.record().is_some());
}

#[test]
fn file_resources_go_to_files_dir() {
    let sandbox = Sandbox::new();
    let bytes = zip_bytes(&[("doc/LICENSE.txt", b"GUST".as_slice())]);
    let manifest = manifest_with(
        "font-latin-modern",
        "2.004",
        "https://downloads.example.test/lm.zip",
        &bytes,
        ArchiveKind::Zip,
        vec![ResourceDeclaration::new(ResourceKind::File, "doc/LICENSE.txt").expect("valid")],
    );
    let fetcher = StaticFetcher::new();
    fetcher.serve("https://downloads.example.test/lm.zip", Served::Bytes(bytes));
    let store = sandbox.store();
    let executor = Executor::new(
        Collaborators {
            fetcher: &fetcher,
            expander: &StandardExpander,
            store: &store,
            hook: &NoopHook,
        },
        sandbox.staging.clone(),
        sandbox.layout.clone(),
    );

    let report = executor.execute(&install(&manifest)).expect("install");
    assert_eq!(
        report.files,
        vec![sandbox.layout.files_dir.join("LICENSE.txt")]
    );
}

#[test]
fn fetcher_is_not_called_when_url_cannot_be_staged() {
    let sandbox = Sandbox::new();
    fs::write(&sandbox.root.join("staging"), "not a directory").expect("block staging");
    let manifest = font_bundle("font-latin-modern", "2.004", FONTS).manifest;
    let mut fetcher = MockArtifactFetcher::new();
    fetcher.expect_fetch().never();
    let store = StateStore::open(&sandbox.state_dir).expect("store");
    let executor = Executor::new(
        Collaborators {
            fetcher: &fetcher,
            expander: &StandardExpander,
            store: &store,
            hook: &NoopHook,
        },
        sandbox.staging.clone(),
        sandbox.layout.clone(),
    );

    let err = executor
        .execute(&install(&manifest))
        .expect_err("staging fails");
    assert_eq!(err.kind(), FailureKind::Io);
    assert_eq!(err.stage, Stage::Fetch);
}

#[test]
fn retry_policy_treats_zero_attempts_as_one() {
    let policy = RetryPolicy {
        attempts: 0,
        backoff: Duration::ZERO,
    };
    let mut calls = 0;
    let result: Result<(), &str> = policy.run("op", || {
        calls += 1;
        Err("boom")
    });
    assert_eq!(result, Err("boom"));
    assert_eq!(calls, 1);
}

#[rstest]
#[case(Stage::Fetch, "fetch")]
#[case(Stage::Record, "record")]
fn stages_render_lowercase(#[case] stage: Stage, #[case] expected: &str) {
    assert_eq!(stage.to_string(), expected);
}
