//! End-to-end orchestration scenarios with a recording provisioner.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

use ssr_stack::resources::{StackOutputs, DEPLOYMENT_ID, DISTRIBUTION_ID};
use ssr_stack::{
    BuildStep, CommandBuild, ErrorKind, Orchestrator, Provisioner, SkipBuild, StackConfig,
    StackError, Template, TemplateDiff, WrittenAssembly,
};

const ADAPTER: &str = r#"import { handler as nitro } from "./index.mjs";

export const handler = async (event, context) => nitro(event, context);
"#;

/// Provisioner that records calls and answers with a fixed domain.
struct RecordingProvisioner {
    domain: String,
    calls: Cell<usize>,
    templates: RefCell<Vec<Template>>,
}

impl RecordingProvisioner {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            calls: Cell::new(0),
            templates: RefCell::new(Vec::new()),
        }
    }
}

impl Provisioner for RecordingProvisioner {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn provision(&self, assembly: &WrittenAssembly) -> ssr_stack::Result<StackOutputs> {
        self.calls.set(self.calls.get() + 1);
        assert!(assembly.template_path.is_file());
        assert!(assembly.assets_path.is_file());
        self.templates
            .borrow_mut()
            .push(Template::read(&assembly.template_path)?);

        let mut outputs = StackOutputs::new();
        outputs.insert("DistributionDomainName", self.domain.as_str());
        Ok(outputs)
    }
}

/// Lay out a built application: server and public bundles plus the adapter.
fn built_app(root: &Path) -> StackConfig {
    write(root, ".output/server/index.mjs", "export const handler = () => {};");
    write(root, ".output/server/chunks/app.mjs", "export default {};");
    write(root, ".output/public/_nuxt/entry.js", "console.log('entry')");
    write(root, ".output/public/assets/logo.png", "png");
    write(root, "static/wrapper.mjs", ADAPTER);

    let path = root.join("ssr.toml");
    StackConfig::default_for_app("shop").save(&path).unwrap();
    StackConfig::load(&path).unwrap()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn happy_path_emits_distribution_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let provisioner = RecordingProvisioner::new("d111111abcdef8.cloudfront.net");

    let outcome = Orchestrator::new(config, &SkipBuild, &provisioner)
        .run()
        .unwrap();

    assert_eq!(outcome.url, "https://d111111abcdef8.cloudfront.net");
    assert_eq!(provisioner.calls.get(), 1);

    // Adapter landed byte-identical under the entry-point name
    let injected = fs::read(dir.path().join(".output/server/wrapper.mjs")).unwrap();
    assert_eq!(injected, ADAPTER.as_bytes());

    let templates = provisioner.templates.borrow();
    let function = templates[0].get("EdgeFunction").unwrap();
    assert_eq!(function.properties["Handler"], "wrapper.handler");
    assert!(templates[0].get(DISTRIBUTION_ID).is_some());
}

#[cfg(unix)]
#[test]
fn failing_build_never_provisions() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let build = CommandBuild::new("sh", vec!["-c".into(), "exit 1".into()]).stream_output(false);
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    let err = Orchestrator::new(config, &build, &provisioner)
        .run()
        .unwrap_err();

    assert!(matches!(err, StackError::BuildFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Build);
    assert_eq!(provisioner.calls.get(), 0);
    assert!(!dir.path().join(".output/server/wrapper.mjs").exists());
    assert!(!dir.path().join(".ssr/out").exists());
}

#[cfg(unix)]
#[test]
fn build_runs_in_app_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let build = CommandBuild::new("sh", vec!["-c".into(), "touch built.marker".into()])
        .stream_output(false);
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    Orchestrator::new(config, &build, &provisioner).run().unwrap();
    assert!(dir.path().join("built.marker").exists());
    assert!(build.describe().starts_with("sh"));
}

#[test]
fn out_of_range_function_limits_never_provision() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = built_app(dir.path());
    config.function.memory_mb = 99999;
    config.function.timeout_secs = 60;
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    let err = Orchestrator::new(config, &SkipBuild, &provisioner)
        .run()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("function.timeout_secs"));
    assert_eq!(provisioner.calls.get(), 0);
    assert!(!dir.path().join(".ssr/out").exists());
}

#[test]
fn missing_server_bundle_fails_at_injection() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    fs::remove_dir_all(dir.path().join(".output/server")).unwrap();
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    let err = Orchestrator::new(config, &SkipBuild, &provisioner)
        .run()
        .unwrap_err();

    assert!(matches!(err, StackError::ArtifactMissing(_)));
    assert_eq!(err.kind(), ErrorKind::Layout);
    assert_eq!(provisioner.calls.get(), 0);
}

#[test]
fn missing_public_bundle_fails_before_provisioning() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    fs::remove_dir_all(dir.path().join(".output/public")).unwrap();
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    let err = Orchestrator::new(config, &SkipBuild, &provisioner)
        .run()
        .unwrap_err();

    assert!(matches!(err, StackError::ArtifactMissing(_)));
    assert_eq!(provisioner.calls.get(), 0);
}

#[test]
fn empty_domain_is_output_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let provisioner = RecordingProvisioner::new("");

    let err = Orchestrator::new(config, &SkipBuild, &provisioner)
        .run()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Output);
    assert_eq!(provisioner.calls.get(), 1);
}

#[test]
fn rerun_over_same_build_only_redeploys_assets() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    Orchestrator::new(config.clone(), &SkipBuild, &provisioner)
        .with_run_id("first")
        .run()
        .unwrap();
    Orchestrator::new(config, &SkipBuild, &provisioner)
        .with_run_id("second")
        .run()
        .unwrap();

    let templates = provisioner.templates.borrow();
    let diff = TemplateDiff::between(&templates[0], &templates[1]);
    assert_eq!(diff.changed().into_iter().collect::<Vec<_>>(), vec![DEPLOYMENT_ID]);
}

#[test]
fn changed_server_code_publishes_new_version() {
    let dir = tempfile::tempdir().unwrap();
    let config = built_app(dir.path());
    let provisioner = RecordingProvisioner::new("d1.cloudfront.net");

    Orchestrator::new(config.clone(), &SkipBuild, &provisioner)
        .with_run_id("first")
        .run()
        .unwrap();
    write(dir.path(), ".output/server/index.mjs", "export const handler = () => 2;");
    Orchestrator::new(config, &SkipBuild, &provisioner)
        .with_run_id("second")
        .run()
        .unwrap();

    let templates = provisioner.templates.borrow();
    let old_versions = templates[0].ids_of_type("AWS::Lambda::Version");
    let new_versions = templates[1].ids_of_type("AWS::Lambda::Version");
    assert_eq!(old_versions.len(), 1);
    assert_eq!(new_versions.len(), 1);
    assert_ne!(old_versions, new_versions);
}
