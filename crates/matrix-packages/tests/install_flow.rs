//! End-to-end install flow against an in-memory package.

use async_trait::async_trait;
use matrix_core::models::{report, GitHubBranch, GitHubCommitRef, GitHubRelease};
use matrix_core::{
    CancellationToken, ErrorKind, GitCommit, InstalledPackage, LaunchOptionDefinition, LaunchOptionType,
    LibraryPaths, MatrixError, PackageVersion, ProcessOutput, ProgressReport, ProgressSender, ProgressType, Result,
    SettingsStore, SharedFolderType,
};
use matrix_packages::installer::{
    InstallOrchestrator, InstallRequest, InstallStage, VersionChoice, VersionSelector,
};
use matrix_packages::package::{PackageDescriptor, PackageEvent, PackageEvents, SharedFolderMap};
use matrix_packages::prerequisites::PrerequisiteHelper;
use matrix_packages::{PackageLauncher, PackageLocks, PackageRegistry, PackageUpdater};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const PACKAGE_NAME: &str = "fake-package";
const HEAD_SHA: &str = "abcdef1234567890";

#[derive(Default)]
struct FakeBehaviour {
    fail_download: bool,
    fail_install: bool,
    /// Download waits for this before returning.
    download_gate: Option<Arc<Notify>>,
}

struct FakePackage {
    paths: LibraryPaths,
    events: PackageEvents,
    behaviour: FakeBehaviour,
    display_name: Mutex<String>,
    install_location: Mutex<Option<PathBuf>>,
    update_available: AtomicBool,
    launch_options: Vec<LaunchOptionDefinition>,
    shared_folders: SharedFolderMap,
    /// Event handlers registered while `install_package` ran.
    handlers_during_install: AtomicUsize,
    started: Notify,
}

impl FakePackage {
    fn new(paths: LibraryPaths, behaviour: FakeBehaviour) -> Self {
        let mut shared_folders = SharedFolderMap::new();
        shared_folders.insert(SharedFolderType::StableDiffusion, PathBuf::from("models/Stable-diffusion"));
        shared_folders.insert(SharedFolderType::Lora, PathBuf::from("models/Lora"));
        Self {
            paths,
            events: PackageEvents::new(),
            behaviour,
            display_name: Mutex::new("Fake Package".to_string()),
            install_location: Mutex::new(None),
            update_available: AtomicBool::new(false),
            launch_options: vec![LaunchOptionDefinition::new("Port", LaunchOptionType::Int, &["--port"])],
            shared_folders,
            handlers_during_install: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    fn console(&self, text: &str) {
        self.events.emit(&PackageEvent::ConsoleOutput(ProcessOutput {
            text: text.to_string(),
            is_stderr: false,
        }));
    }
}

#[async_trait]
impl PackageDescriptor for FakePackage {
    fn name(&self) -> &str {
        PACKAGE_NAME
    }

    fn display_name(&self) -> String {
        self.display_name.lock().unwrap().clone()
    }

    fn set_display_name(&self, display_name: &str) {
        *self.display_name.lock().unwrap() = display_name.to_string();
    }

    fn author(&self) -> &str {
        "tester"
    }

    fn blurb(&self) -> &str {
        "A package that lives in memory"
    }

    fn github_url(&self) -> &str {
        "https://github.com/tester/fake-package"
    }

    fn launch_command(&self) -> &str {
        "main.py"
    }

    fn preview_image_url(&self) -> &str {
        ""
    }

    fn launch_options(&self) -> &[LaunchOptionDefinition] {
        &self.launch_options
    }

    fn shared_folders(&self) -> Option<&SharedFolderMap> {
        Some(&self.shared_folders)
    }

    fn download_location(&self) -> PathBuf {
        self.paths.download_archive(PACKAGE_NAME)
    }

    fn install_location(&self) -> Option<PathBuf> {
        self.install_location.lock().unwrap().clone()
    }

    fn set_install_location(&self, location: PathBuf) {
        *self.install_location.lock().unwrap() = Some(location);
    }

    fn update_available(&self) -> bool {
        self.update_available.load(Ordering::SeqCst)
    }

    fn set_update_available(&self, available: bool) {
        self.update_available.store(available, Ordering::SeqCst);
    }

    fn events(&self) -> &PackageEvents {
        &self.events
    }

    async fn get_all_versions(&self, use_releases: bool) -> Result<Vec<PackageVersion>> {
        if use_releases {
            Ok(vec![
                PackageVersion::new("v2.0", Some("Second".to_string())),
                PackageVersion::new("v1.0", Some("First".to_string())),
            ])
        } else {
            Ok(["dev", "master", "feature-x"]
                .into_iter()
                .map(|b| PackageVersion::new(b, Some(format!("head of {}", b))))
                .collect())
        }
    }

    async fn get_all_branches(&self) -> Result<Vec<GitHubBranch>> {
        Ok(vec![GitHubBranch {
            name: "master".to_string(),
            commit: GitHubCommitRef {
                sha: HEAD_SHA.to_string(),
                url: None,
            },
        }])
    }

    async fn get_all_releases(&self) -> Result<Vec<GitHubRelease>> {
        Ok(Vec::new())
    }

    async fn get_latest_version(&self) -> Result<String> {
        Ok("v2.0".to_string())
    }

    async fn get_all_commits(&self, branch: &str, _page: u32, _per_page: u32) -> Result<Option<Vec<GitCommit>>> {
        Ok(Some(vec![
            GitCommit {
                sha: HEAD_SHA.to_string(),
                label: format!("Latest on {}", branch),
            },
            GitCommit {
                sha: "0123456789abcdef".to_string(),
                label: "Older".to_string(),
            },
        ]))
    }

    async fn download_package(
        &self,
        version: &str,
        _is_commit_hash: bool,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.started.notify_one();
        if let Some(gate) = &self.behaviour.download_gate {
            cancel.run_until_cancelled(gate.notified()).await?;
        }
        report(
            progress,
            ProgressReport::new(0.5, ProgressType::Download).with_message("Downloading package..."),
        )
        .await;
        if self.behaviour.fail_download {
            return Err(MatrixError::Network {
                message: format!("could not fetch {}", version),
                status_code: Some(503),
            });
        }
        let archive = self.download_location();
        std::fs::write(&archive, version).map_err(|e| MatrixError::io_with_path(e, &archive))?;
        report(progress, ProgressReport::new(1.0, ProgressType::Download)).await;
        Ok(archive)
    }

    async fn install_package(&self, progress: Option<&ProgressSender>, _cancel: &CancellationToken) -> Result<()> {
        self.handlers_during_install
            .store(self.events.subscriber_count(), Ordering::SeqCst);
        report(
            progress,
            ProgressReport::indeterminate(ProgressType::Generic).with_message("Installing requirements"),
        )
        .await;
        self.console("Collecting torch");

        if self.behaviour.fail_install {
            return Err(MatrixError::InstallStep {
                message: "pip exited with code 1".to_string(),
            });
        }

        let location = self.install_location().ok_or_else(|| MatrixError::InstallStep {
            message: "install location not set".to_string(),
        })?;
        let checkpoints = location.join("models/Stable-diffusion");
        std::fs::create_dir_all(&checkpoints)?;
        std::fs::write(checkpoints.join("Put models here.txt"), "")?;
        self.console("Successfully installed torch");
        Ok(())
    }

    async fn run_package(&self, _install_path: &Path, arguments: &[String]) -> Result<()> {
        self.console(&format!("args: {}", arguments.join(" ")));
        self.events
            .emit(&PackageEvent::StartupComplete("http://127.0.0.1:7860".to_string()));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn check_for_updates(&self, package: &InstalledPackage) -> Result<bool> {
        let available = package.package_version != "v2.0";
        self.set_update_available(available);
        Ok(available)
    }

    async fn update(
        &self,
        _package: &InstalledPackage,
        progress: Option<&ProgressSender>,
        _include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.download_package("v2.0", false, progress, cancel).await?;
        self.install_package(progress, cancel).await?;
        Ok("v2.0".to_string())
    }
}

#[derive(Default)]
struct FakePrerequisites {
    fail: bool,
}

#[async_trait]
impl PrerequisiteHelper for FakePrerequisites {
    async fn install_git_if_necessary(
        &self,
        progress: Option<&ProgressSender>,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        report(
            progress,
            ProgressReport::new(0.4, ProgressType::Download).with_message("Downloading git"),
        )
        .await;
        if self.fail {
            return Err(MatrixError::Prerequisite {
                name: "git".to_string(),
                message: "no network".to_string(),
            });
        }
        Ok(())
    }

    async fn ensure_pip(&self, _progress: Option<&ProgressSender>, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn ensure_virtualenv(&self, _progress: Option<&ProgressSender>, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    _temp: TempDir,
    paths: LibraryPaths,
    settings: Arc<SettingsStore>,
    package: Arc<FakePackage>,
    locks: PackageLocks,
    orchestrator: Arc<InstallOrchestrator>,
}

impl Harness {
    fn new(behaviour: FakeBehaviour) -> Self {
        Self::with_prerequisites(behaviour, FakePrerequisites::default())
    }

    fn with_prerequisites(behaviour: FakeBehaviour, prerequisites: FakePrerequisites) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = LibraryPaths::new(temp.path());
        let settings = Arc::new(SettingsStore::open(paths.settings_file()).unwrap());
        let package = Arc::new(FakePackage::new(paths.clone(), behaviour));
        let locks = PackageLocks::new();
        let orchestrator = Arc::new(InstallOrchestrator::new(
            paths.clone(),
            Arc::clone(&settings),
            Arc::new(prerequisites),
            locks.clone(),
        ));
        Self {
            _temp: temp,
            paths,
            settings,
            package,
            locks,
            orchestrator,
        }
    }

    fn updater(&self) -> PackageUpdater {
        PackageUpdater::new(self.paths.clone(), Arc::clone(&self.settings), self.registry(), self.locks.clone())
    }

    fn launcher(&self) -> PackageLauncher {
        PackageLauncher::new(self.paths.clone(), Arc::clone(&self.settings), self.registry(), self.locks.clone())
    }

    fn request(&self, install_name: &str, version: VersionChoice) -> InstallRequest {
        InstallRequest {
            descriptor: self.package.clone(),
            install_name: install_name.to_string(),
            version,
        }
    }

    fn release(&self, install_name: &str) -> InstallRequest {
        self.request(install_name, VersionChoice::Release { tag: "v1.0".to_string() })
    }

    fn registry(&self) -> Arc<PackageRegistry> {
        let mut registry = PackageRegistry::new();
        registry.register(self.package.clone());
        Arc::new(registry)
    }
}

#[tokio::test]
async fn test_successful_install_records_one_package() {
    let h = Harness::new(FakeBehaviour::default());
    let outcome = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap();

    let settings = h.settings.settings();
    assert_eq!(settings.installed_packages.len(), 1);
    let record = &settings.installed_packages[0];
    assert_eq!(record, &outcome.installed);
    assert_eq!(record.package_name, PACKAGE_NAME);
    assert_eq!(record.package_version, "v1.0");
    assert_eq!(record.display_version, "v1.0");
    assert_eq!(record.installed_branch, None);
    assert_eq!(record.display_name, "webui");
    assert_eq!(record.launch_command, "main.py");
    assert_eq!(record.library_path, LibraryPaths::relative_install_path("webui"));
    assert_eq!(settings.active_installed_package, Some(record.id));

    assert_eq!(h.package.install_location(), Some(h.paths.install_dir("webui")));

    let state = h.orchestrator.state();
    assert_eq!(state.stage, InstallStage::Done);
    assert_eq!(state.value, 100.0);
    assert!(!state.is_indeterminate);
    assert!(!state.duplicate_warning);
    assert_eq!(state.description, "Successfully installed torch");

    // Reopening reads the committed file.
    let reopened = SettingsStore::open(h.paths.settings_file()).unwrap();
    assert_eq!(reopened.settings(), settings);
}

#[tokio::test]
async fn test_branch_install_records_branch_and_display_version() {
    let h = Harness::new(FakeBehaviour::default());
    let version = VersionChoice::Commit {
        branch: "main".to_string(),
        sha: "abcdef1234567".to_string(),
    };
    let outcome = h
        .orchestrator
        .install(h.request("comfy", version), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.installed.package_version, "abcdef1234567");
    assert_eq!(outcome.installed.installed_branch.as_deref(), Some("main"));
    assert_eq!(outcome.installed.display_version, "main@abcdef1");
}

#[tokio::test]
async fn test_duplicate_name_warns_and_proceeds() {
    let h = Harness::new(FakeBehaviour::default());
    let cancel = CancellationToken::new();
    h.orchestrator.install(h.release("webui"), &cancel).await.unwrap();
    assert!(!h.orchestrator.state().duplicate_warning);

    h.orchestrator.install(h.release("webui"), &cancel).await.unwrap();
    let state = h.orchestrator.state();
    assert!(state.duplicate_warning);
    assert_eq!(state.stage, InstallStage::Done);
    assert_eq!(h.settings.settings().installed_packages.len(), 2);
}

#[tokio::test]
async fn test_failed_download_leaves_settings_unchanged() {
    let h = Harness::new(FakeBehaviour {
        fail_download: true,
        ..Default::default()
    });
    let err = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(h.settings.settings().installed_packages.is_empty());
    assert_eq!(h.settings.settings().active_installed_package, None);

    let state = h.orchestrator.state();
    assert_eq!(state.stage, InstallStage::Failed);
    assert_eq!(state.value, 0.0);
    assert!(!state.is_indeterminate);
    assert_eq!(h.package.events().subscriber_count(), 0);
}

#[tokio::test]
async fn test_console_handler_scoped_to_install_stage() {
    let h = Harness::new(FakeBehaviour::default());
    h.orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(h.package.handlers_during_install.load(Ordering::SeqCst), 1);
    assert_eq!(h.package.events().subscriber_count(), 0);

    let mut states = h.orchestrator.subscribe();
    let description = h.orchestrator.state().description;
    h.package.console("late line");
    assert!(!states.has_changed().unwrap());
    assert_eq!(h.orchestrator.state().description, description);
}

#[tokio::test]
async fn test_failed_install_step_releases_console_handler() {
    let h = Harness::new(FakeBehaviour {
        fail_install: true,
        ..Default::default()
    });
    let err = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InstallStep);
    assert_eq!(h.package.handlers_during_install.load(Ordering::SeqCst), 1);
    assert_eq!(h.package.events().subscriber_count(), 0);
    assert_eq!(h.orchestrator.state().description, "Collecting torch");
    assert!(h.settings.settings().installed_packages.is_empty());
}

#[tokio::test]
async fn test_prerequisite_failure_keeps_its_kind() {
    let h = Harness::with_prerequisites(FakeBehaviour::default(), FakePrerequisites { fail: true });
    let err = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Prerequisite);
    let state = h.orchestrator.state();
    assert_eq!(state.stage, InstallStage::Failed);
    assert_eq!(state.value, 0.0);
    assert_eq!(h.package.install_location(), None);
}

#[tokio::test]
async fn test_invalid_name_publishes_nothing() {
    let h = Harness::new(FakeBehaviour::default());
    let mut states = h.orchestrator.subscribe();

    for name in ["", "   ", "../escape", "a/b"] {
        let err = h
            .orchestrator
            .install(h.release(name), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert!(!states.has_changed().unwrap());
    assert_eq!(h.orchestrator.state().stage, InstallStage::Idle);
    assert!(!h.paths.packages_dir().exists());
    assert_eq!(h.package.install_location(), None);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = Harness::new(FakeBehaviour::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.orchestrator.install(h.release("webui"), &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(h.orchestrator.state().stage, InstallStage::Failed);
    assert!(h.settings.settings().installed_packages.is_empty());
}

#[tokio::test]
async fn test_cancel_during_download() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeBehaviour {
        download_gate: Some(gate),
        ..Default::default()
    });
    let cancel = CancellationToken::new();

    let orchestrator = Arc::clone(&h.orchestrator);
    let request = h.release("webui");
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move { orchestrator.install(request, &task_cancel).await });

    h.package.started.notified().await;
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let state = h.orchestrator.state();
    assert_eq!(state.stage, InstallStage::Failed);
    assert_eq!(state.value, 0.0);
    assert!(h.settings.settings().installed_packages.is_empty());
}

#[tokio::test]
async fn test_concurrent_install_of_same_package_rejected() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeBehaviour {
        download_gate: Some(Arc::clone(&gate)),
        ..Default::default()
    });

    let orchestrator = Arc::clone(&h.orchestrator);
    let request = h.release("first");
    let task = tokio::spawn(async move { orchestrator.install(request, &CancellationToken::new()).await });
    h.package.started.notified().await;

    let err = h
        .orchestrator
        .install(h.release("second"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    gate.notify_one();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome.installed.display_name, "first");
    assert_eq!(h.settings.settings().installed_packages.len(), 1);
}

#[tokio::test]
async fn test_update_and_launch_wait_for_running_install() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeBehaviour::default());
    let installed = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap()
        .installed;

    let gated = Harness {
        package: Arc::new(FakePackage::new(
            h.paths.clone(),
            FakeBehaviour {
                download_gate: Some(Arc::clone(&gate)),
                ..Default::default()
            },
        )),
        ..h
    };
    let orchestrator = Arc::clone(&gated.orchestrator);
    let request = gated.release("second");
    let task = tokio::spawn(async move { orchestrator.install(request, &CancellationToken::new()).await });
    gated.package.started.notified().await;
    assert_eq!(gated.locks.holder(PACKAGE_NAME), Some("install"));

    let cancel = CancellationToken::new();
    let update_err = gated.updater().update(installed.id, false, None, &cancel).await.unwrap_err();
    assert_eq!(update_err.kind(), ErrorKind::Validation);
    let launch_err = gated.launcher().launch(installed.id, None).await.unwrap_err();
    assert_eq!(launch_err.kind(), ErrorKind::Validation);
    assert_eq!(gated.package.install_location(), Some(gated.paths.install_dir("second")));

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(gated.locks.holder(PACKAGE_NAME), None);
    assert_eq!(gated.settings.settings().installed_packages.len(), 2);
}

#[tokio::test]
async fn test_persistence_failure_reports_and_keeps_list() {
    let h = Harness::new(FakeBehaviour::default());
    std::fs::create_dir_all(h.paths.settings_file()).unwrap();

    let err = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(h.settings.settings().installed_packages.is_empty());
    assert_eq!(h.orchestrator.state().stage, InstallStage::Failed);
}

#[tokio::test]
async fn test_shipped_model_folders_are_adopted() {
    let h = Harness::new(FakeBehaviour::default());
    let outcome = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.link_warnings.is_empty());
    let install_dir = h.paths.install_dir("webui");
    for folder in ["models/Stable-diffusion", "models/Lora"] {
        let link = install_dir.join(folder);
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    }
    assert!(h.paths.models_dir().join("StableDiffusion/Put models here.txt").is_file());
    assert_eq!(h.orchestrator.state().stage, InstallStage::Done);
}

#[tokio::test]
async fn test_model_folder_conflict_is_a_warning() {
    let h = Harness::new(FakeBehaviour::default());
    let shared = h.paths.models_dir().join("StableDiffusion");
    std::fs::create_dir_all(&shared).unwrap();
    std::fs::write(shared.join("Put models here.txt"), "already here").unwrap();

    let outcome = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.link_warnings.len(), 1);
    assert_eq!(outcome.link_warnings[0].folder, SharedFolderType::StableDiffusion);
    let checkpoints = h.paths.install_dir("webui").join("models/Stable-diffusion");
    assert!(checkpoints.join("Put models here.txt").is_file());
    assert!(!checkpoints.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(h.orchestrator.state().stage, InstallStage::Done);
}

#[tokio::test]
async fn test_progress_reaches_subscribers() {
    let h = Harness::new(FakeBehaviour::default());
    let mut states = h.orchestrator.subscribe();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let collector = {
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().clone();
                let done = state.stage.is_terminal();
                seen.lock().unwrap().push(state.stage);
                if done {
                    break;
                }
            }
        })
    };

    h.orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .unwrap()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&InstallStage::Done));
}

#[tokio::test]
async fn test_version_selector_defaults() {
    let h = Harness::new(FakeBehaviour::default());
    let mut selector = VersionSelector::new(h.package.clone());
    assert!(selector.is_release_mode());

    selector.load().await.unwrap();
    assert_eq!(selector.selected_version().unwrap().tag_name, "v2.0");
    assert_eq!(
        selector.choice(),
        Some(VersionChoice::Release { tag: "v2.0".to_string() })
    );

    selector.set_release_mode(false).await.unwrap();
    assert_eq!(selector.selected_version().unwrap().tag_name, "master");
    assert_eq!(selector.release_notes(), Some("head of master"));
    assert_eq!(selector.selected_commit().unwrap().sha, HEAD_SHA);
    assert_eq!(
        selector.choice(),
        Some(VersionChoice::Commit {
            branch: "master".to_string(),
            sha: HEAD_SHA.to_string(),
        })
    );

    selector.select_version("dev").await.unwrap();
    assert_eq!(selector.selected_commit().unwrap().label, "Latest on dev");
    selector.select_commit("0123456").unwrap();
    assert_eq!(selector.selected_commit().unwrap().label, "Older");
    assert_eq!(
        selector.select_version("nope").await.unwrap_err().kind(),
        ErrorKind::InvalidVersion
    );
}

#[tokio::test]
async fn test_update_keeps_identity() {
    let h = Harness::new(FakeBehaviour::default());
    let cancel = CancellationToken::new();
    let installed = h
        .orchestrator
        .install(h.release("webui"), &cancel)
        .await
        .unwrap()
        .installed;

    let install_dir = h.paths.install_dir("webui");
    let lora = install_dir.join("models/Lora");
    std::fs::remove_file(&lora).unwrap();
    std::fs::create_dir_all(install_dir.join("outputs")).unwrap();
    std::fs::write(install_dir.join("outputs/grid.png"), "png").unwrap();

    let updater = h.updater();
    assert!(updater.check_for_updates(installed.id).await.unwrap());
    assert!(h.settings.settings().installed_packages[0].update_available);

    let outcome = updater.update(installed.id, false, None, &cancel).await.unwrap();
    assert!(outcome.link_warnings.is_empty());
    assert!(lora.symlink_metadata().unwrap().file_type().is_symlink());
    assert!(install_dir.join("outputs/grid.png").is_file());

    let updated = outcome.updated;
    assert_eq!(updated.id, installed.id);
    assert_eq!(updated.library_path, installed.library_path);
    assert_eq!(updated.display_name, installed.display_name);
    assert_eq!(updated.package_version, "v2.0");
    assert_eq!(updated.display_version, "v2.0");
    assert!(!updated.update_available);
    assert_eq!(h.settings.settings().installed_packages, vec![updated]);

    let missing = updater.check_for_updates(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, MatrixError::InstalledPackageNotFound { .. }));
}

#[tokio::test]
async fn test_launch_delivers_events_to_handler() {
    let h = Harness::new(FakeBehaviour::default());
    let installed = h
        .orchestrator
        .install(h.release("webui"), &CancellationToken::new())
        .await
        .unwrap()
        .installed;

    let urls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&urls);
    let launcher = h.launcher();
    let subscription = launcher
        .launch(
            installed.id,
            Some(Arc::new(move |event: &PackageEvent| {
                if let PackageEvent::StartupComplete(url) = event {
                    sink.lock().unwrap().push(url.clone());
                }
            })),
        )
        .await
        .unwrap();

    assert_eq!(*urls.lock().unwrap(), vec!["http://127.0.0.1:7860".to_string()]);
    assert_eq!(h.package.events().subscriber_count(), 1);
    drop(subscription);
    assert_eq!(h.package.events().subscriber_count(), 0);
    launcher.stop(installed.id).await.unwrap();
}
