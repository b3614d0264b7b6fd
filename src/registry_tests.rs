//! Registry behaviour: handle lookup, batch build failures, the watch state
//! machine and listener delivery.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use crate::error::{CrxmError, PluginError};
    use crate::plugin::{FilePlugin, Plugin, ResultSender, TargetPlugins, WatchHandle};
    use crate::registry::{TargetFlag, TargetRegistry, WatchState};

    /// Counts compiles and returns the path as bytes.
    #[derive(Default)]
    struct EchoPlugin {
        compiles: AtomicUsize,
    }

    struct NoopWatch;

    impl WatchHandle for NoopWatch {
        fn stop(self: Box<Self>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    impl Plugin for EchoPlugin {
        fn name(&self) -> &str {
            "echo"
        }

        fn compile(&self, path: &Path) -> Result<Vec<u8>, PluginError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(path.to_string_lossy().into_owned().into_bytes())
        }

        fn watch(
            self: Arc<Self>,
            path: &Path,
            on_result: ResultSender,
        ) -> Result<Box<dyn WatchHandle>, PluginError> {
            on_result(self.compile(path)?);
            Ok(Box::new(NoopWatch))
        }
    }

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn compile(&self, path: &Path) -> Result<Vec<u8>, PluginError> {
            Err(PluginError::compile(self.name(), path, "broken on purpose"))
        }

        fn watch(
            self: Arc<Self>,
            path: &Path,
            _on_result: ResultSender,
        ) -> Result<Box<dyn WatchHandle>, PluginError> {
            Err(PluginError::compile(self.name(), path, "cannot watch"))
        }
    }

    /// Watches without compiling; counts how many of its watchers were stopped.
    #[derive(Default)]
    struct StopCounter {
        stopped: Arc<AtomicUsize>,
    }

    struct CountedWatch(Arc<AtomicUsize>);

    impl WatchHandle for CountedWatch {
        fn stop(self: Box<Self>) -> Result<(), PluginError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Plugin for StopCounter {
        fn name(&self) -> &str {
            "stop-counter"
        }

        fn compile(&self, path: &Path) -> Result<Vec<u8>, PluginError> {
            Ok(path.to_string_lossy().into_owned().into_bytes())
        }

        fn watch(
            self: Arc<Self>,
            path: &Path,
            on_result: ResultSender,
        ) -> Result<Box<dyn WatchHandle>, PluginError> {
            on_result(self.compile(path)?);
            Ok(Box::new(CountedWatch(Arc::clone(&self.stopped))))
        }
    }

    fn plugins(p: Arc<dyn Plugin>) -> TargetPlugins {
        TargetPlugins {
            build: Arc::clone(&p),
            watch: p,
        }
    }

    fn project(files: &[&str]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let paths = files
            .iter()
            .map(|f| {
                let p = dir.path().join(f);
                fs::write(&p, format!("// {f}")).unwrap();
                p
            })
            .collect();
        (dir, paths)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Handles
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn handle_lookup_until_removed() {
        let mut reg = TargetRegistry::new();
        let echo: Arc<dyn Plugin> = Arc::new(EchoPlugin::default());
        let path = Path::new("/p/a.js");

        let h = reg.add_target(path, plugins(Arc::clone(&echo)), TargetFlag::Content);
        assert_eq!(reg.handle_for_path(path, Some(TargetFlag::Content)), Some(h.clone()));
        assert_eq!(reg.handle_for_path(path, None), Some(h));
        assert_eq!(reg.handle_for_path(path, Some(TargetFlag::Css)), None);

        reg.remove_target(path, Some(TargetFlag::Content));
        assert_eq!(reg.handle_for_path(path, Some(TargetFlag::Content)), None);

        // repeated removal is harmless
        reg.remove_target(path, Some(TargetFlag::Content));
        reg.remove_target(path, None);
        assert!(reg.is_empty());
    }

    #[test]
    fn same_path_under_two_flags_is_two_targets() {
        let mut reg = TargetRegistry::new();
        let echo: Arc<dyn Plugin> = Arc::new(EchoPlugin::default());
        let path = Path::new("/p/shared.js");

        let content = reg.add_target(path, plugins(Arc::clone(&echo)), TargetFlag::Content);
        let html = reg.add_target(path, plugins(echo), TargetFlag::HtmlScript);
        assert_ne!(content, html);

        reg.remove_target(path, Some(TargetFlag::HtmlScript));
        assert_eq!(reg.handle_for_path(path, None), Some(content));
    }

    #[test]
    fn handles_are_never_reused() {
        let mut reg = TargetRegistry::new();
        let echo: Arc<dyn Plugin> = Arc::new(EchoPlugin::default());
        let path = Path::new("/p/a.js");

        let first = reg.add_target(path, plugins(Arc::clone(&echo)), TargetFlag::Content);
        reg.remove_target(path, None);
        let second = reg.add_target(path, plugins(echo), TargetFlag::Content);

        assert_ne!(first, second);
        assert!(reg.target(&first).is_none());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // build / compile_force
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn build_compiles_every_target() {
        let (_dir, paths) = project(&["a.js", "b.js", "c.css"]);
        let echo = Arc::new(EchoPlugin::default());
        let mut reg = TargetRegistry::new();
        for p in &paths {
            reg.add_target(p, plugins(echo.clone()), TargetFlag::Content);
        }

        reg.build().unwrap();

        assert_eq!(echo.compiles.load(Ordering::SeqCst), 3);
        for p in &paths {
            let bytes = reg.result_for_path(p, Some(TargetFlag::Content)).unwrap();
            assert_eq!(&*bytes, p.to_string_lossy().as_bytes());
        }
    }

    #[test]
    fn build_fails_on_missing_entry() {
        let (_dir, paths) = project(&["a.js"]);
        let mut reg = TargetRegistry::new();
        let echo: Arc<dyn Plugin> = Arc::new(EchoPlugin::default());
        reg.add_target(&paths[0], plugins(Arc::clone(&echo)), TargetFlag::Content);
        reg.add_target("/nowhere/b.js", plugins(echo), TargetFlag::Content);

        match reg.build() {
            Err(CrxmError::MissingEntry(p)) => assert_eq!(p, PathBuf::from("/nowhere/b.js")),
            other => panic!("expected MissingEntry, got {other:?}"),
        }
        assert!(reg.result_for_path(&paths[0], None).is_none());
    }

    #[test]
    fn build_propagates_plugin_failures() {
        let (_dir, paths) = project(&["a.js"]);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(Arc::new(FailingPlugin)), TargetFlag::Content);

        let err = reg.build().unwrap_err();
        assert!(matches!(err, CrxmError::Plugin(PluginError::Compile { .. })));
    }

    #[test]
    fn missing_result_is_compiled_on_demand() {
        let (_dir, paths) = project(&["a.js"]);
        let echo = Arc::new(EchoPlugin::default());
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(echo.clone()), TargetFlag::Sw);

        assert!(reg.result_for_path(&paths[0], None).is_none());
        let bytes = reg.result_or_compile(&paths[0], Some(TargetFlag::Sw)).unwrap();
        assert!(bytes.is_some());
        assert_eq!(echo.compiles.load(Ordering::SeqCst), 1);

        // second lookup uses the stored result
        reg.result_or_compile(&paths[0], Some(TargetFlag::Sw)).unwrap();
        assert_eq!(echo.compiles.load(Ordering::SeqCst), 1);

        assert!(reg
            .result_or_compile(Path::new("/unregistered.js"), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn compile_force_unknown_handle() {
        let (_dir, paths) = project(&["a.js"]);
        let mut reg = TargetRegistry::new();
        let h = reg.add_target(&paths[0], plugins(Arc::new(EchoPlugin::default())), TargetFlag::Content);
        reg.remove_target(&paths[0], None);

        assert!(matches!(reg.compile_force(&h), Err(CrxmError::UnknownTarget(_))));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // watch state machine
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn watch_twice_is_rejected() {
        let (_dir, paths) = project(&["a.js"]);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(Arc::new(EchoPlugin::default())), TargetFlag::Content);

        reg.watch().unwrap();
        assert_eq!(reg.state(), WatchState::Watching);
        assert!(matches!(reg.watch(), Err(CrxmError::WatchAlreadyActive)));

        reg.stop_watch();
        reg.stop_watch();
        assert_eq!(reg.state(), WatchState::Stopped);
        reg.watch().unwrap();
    }

    #[test]
    fn removing_a_watched_target_stops_only_its_watcher() {
        let (_dir, paths) = project(&["a.js", "b.js"]);
        let counter = Arc::new(StopCounter::default());
        let stopped = Arc::clone(&counter.stopped);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(counter.clone()), TargetFlag::Content);
        reg.add_target(&paths[1], plugins(counter), TargetFlag::Content);

        reg.watch().unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 0);

        reg.remove_target(&paths[0], None);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(reg.result_for_path(&paths[0], None).is_none());
        assert!(reg.result_for_path(&paths[1], None).is_some());
        assert_eq!(reg.state(), WatchState::Watching);

        reg.stop_watch();
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_watch_start_leaves_registry_stopped() {
        let (_dir, paths) = project(&["a.js", "b.js"]);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(Arc::new(EchoPlugin::default())), TargetFlag::Content);
        reg.add_target(&paths[1], plugins(Arc::new(FailingPlugin)), TargetFlag::Content);

        assert!(reg.watch().is_err());
        assert_eq!(reg.state(), WatchState::Stopped);
    }

    #[test]
    fn listeners_receive_watch_results() {
        let (_dir, paths) = project(&["a.js"]);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(Arc::new(EchoPlugin::default())), TargetFlag::Css);

        let seen: Arc<Mutex<Vec<TargetFlag>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let id = reg.add_listener(Arc::new(move |t| sink.lock().push(t.flag)));

        reg.watch().unwrap();
        assert_eq!(*seen.lock(), vec![TargetFlag::Css]);
        assert!(reg.result_for_path(&paths[0], None).is_some());

        reg.stop_watch();
        reg.remove_listener(id);
        reg.watch().unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn file_watch_reports_edits_through_listeners() {
        let (_dir, paths) = project(&["style.css"]);
        let mut reg = TargetRegistry::new();
        reg.add_target(&paths[0], plugins(Arc::new(FilePlugin)), TargetFlag::Css);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        reg.add_listener(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        reg.watch().unwrap();
        fs::write(&paths[0], "body { color: red }").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        reg.stop_watch();

        assert!(hits.load(Ordering::SeqCst) >= 2);
        let bytes = reg.result_for_path(&paths[0], None).unwrap();
        assert_eq!(&*bytes, b"body { color: red }");
    }
}
