use patchloop_core::{
    CancelToken, ExecutionOutcome, FixProvider, FixSuggestion, FixedFile, LocalRunner, LogEntry,
    LogKind, ProjectFileSet, ProviderError, RemoteSimulator, RepairLoop, RepairOptions,
    RunnerError, RunnerKind, SessionError, SessionState, Status,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

struct ScriptedSimulator {
    outcomes: Mutex<VecDeque<Result<ExecutionOutcome, RunnerError>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedSimulator {
    fn new(outcomes: Vec<Result<ExecutionOutcome, RunnerError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.seen.lock().expect("lock should work").len()
    }
}

impl RemoteSimulator for ScriptedSimulator {
    fn simulate(&self, files: &ProjectFileSet) -> Result<ExecutionOutcome, RunnerError> {
        let main = files
            .iter()
            .map(|f| f.content.clone())
            .collect::<Vec<_>>()
            .join("|");
        self.seen.lock().expect("lock should work").push(main);
        self.outcomes
            .lock()
            .expect("lock should work")
            .pop_front()
            .unwrap_or_else(|| Err(RunnerError::Remote("script exhausted".to_string())))
    }
}

#[derive(Default)]
struct ScriptedLocal {
    sources: Vec<String>,
}

impl LocalRunner for ScriptedLocal {
    fn run(&mut self, source: &str) -> Result<ExecutionOutcome, RunnerError> {
        self.sources.push(source.to_string());
        Ok(ExecutionOutcome::success(vec!["local ok".to_string()]))
    }
}

struct ScriptedFixer {
    replies: Mutex<VecDeque<Result<FixSuggestion, ProviderError>>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedFixer {
    fn new(replies: Vec<Result<FixSuggestion, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().expect("lock should work").len()
    }
}

impl FixProvider for ScriptedFixer {
    fn fix(
        &self,
        _files: &ProjectFileSet,
        error: &str,
        hint: Option<&str>,
    ) -> Result<FixSuggestion, ProviderError> {
        self.requests
            .lock()
            .expect("lock should work")
            .push((error.to_string(), hint.map(ToString::to_string)));
        self.replies
            .lock()
            .expect("lock should work")
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Unavailable("no reply scripted".to_string())))
    }
}

fn python_project() -> ProjectFileSet {
    let mut files = ProjectFileSet::new();
    files
        .add(
            "main.py",
            "def process_data(data):\n    return sum(data) / len(data)\n\nprint(process_data([]))",
        )
        .expect("add should work");
    files
}

fn fix_for(path: &str, content: &str, explanation: &str) -> FixSuggestion {
    FixSuggestion {
        fixed_files: vec![FixedFile {
            name: path.to_string(),
            content: content.to_string(),
        }],
        explanation: explanation.to_string(),
        error_analysis: "analysis".to_string(),
    }
}

fn failure(error: &str) -> Result<ExecutionOutcome, RunnerError> {
    Ok(ExecutionOutcome::failure(Vec::new(), error))
}

fn repair_loop(
    simulator: ScriptedSimulator,
    fixer: ScriptedFixer,
) -> RepairLoop<ScriptedLocal, ScriptedSimulator, ScriptedFixer> {
    RepairLoop {
        local: ScriptedLocal::default(),
        remote: simulator,
        fixer,
        options: RepairOptions {
            settle_delay: Duration::ZERO,
            hint: None,
        },
    }
}

fn run(
    repair: &mut RepairLoop<ScriptedLocal, ScriptedSimulator, ScriptedFixer>,
    session: &mut SessionState,
) -> (Status, Vec<LogEntry>) {
    let mut observed = Vec::new();
    let status = repair
        .run(session, &CancelToken::new(), &mut |entry: &LogEntry| observed.push(entry.clone()))
        .expect("run should start");
    (status, observed)
}

#[test]
fn n_failures_then_success_performs_n_cycles() {
    for n in 0..=3 {
        let mut outcomes: Vec<_> = (0..n).map(|i| failure(&format!("error {i}"))).collect();
        outcomes.push(Ok(ExecutionOutcome::success(vec!["done".to_string()])));
        let fixes = (0..n)
            .map(|i| Ok(fix_for("main.py", &format!("v{i}"), "patched")))
            .collect();

        let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(fixes));
        let mut session = SessionState::new(python_project(), 3);
        let (status, _) = run(&mut repair, &mut session);

        assert_eq!(status, Status::Success, "n = {n}");
        assert_eq!(session.retry_count(), n);
        assert_eq!(repair.fixer.calls(), n);
        assert_eq!(repair.remote.calls(), n + 1);
    }
}

#[test]
fn failing_every_attempt_exhausts_the_budget() {
    let outcomes = (0..4).map(|_| failure("still broken")).collect();
    let fixes = (0..3)
        .map(|i| Ok(fix_for("main.py", &format!("v{i}"), "patched")))
        .collect();
    let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(fixes));
    let mut session = SessionState::new(python_project(), 3);

    let (status, _) = run(&mut repair, &mut session);

    assert_eq!(status, Status::Failed);
    assert_eq!(session.retry_count(), 3);
    assert_eq!(repair.remote.calls(), 4);
    assert_eq!(repair.fixer.calls(), 3);
    assert_eq!(session.logs().last().map(|e| e.kind), Some(LogKind::Exhausted));
}

#[test]
fn provider_failure_at_cycle_k_stops_immediately() {
    for k in 1..=3 {
        let outcomes = (0..k).map(|_| failure("broken")).collect();
        let mut fixes: Vec<_> = (1..k)
            .map(|i| Ok(fix_for("main.py", &format!("v{i}"), "patched")))
            .collect();
        fixes.push(Err(ProviderError::Malformed("not json".to_string())));

        let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(fixes));
        let mut session = SessionState::new(python_project(), 3);
        let (status, _) = run(&mut repair, &mut session);

        assert_eq!(status, Status::Failed, "k = {k}");
        assert_eq!(session.retry_count(), k - 1);
        assert_eq!(repair.remote.calls(), k);
        let last = session.logs().last().expect("log should not be empty");
        assert_eq!(last.kind, LogKind::ProviderFailure);
        assert!(last.message.contains("not json"));
    }
}

#[test]
fn runner_infrastructure_failure_is_fatal() {
    let outcomes = vec![Err(RunnerError::Remote("connection refused".to_string()))];
    let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(Vec::new()));
    let mut session = SessionState::new(python_project(), 3);

    let (status, _) = run(&mut repair, &mut session);

    assert_eq!(status, Status::Failed);
    assert_eq!(session.retry_count(), 0);
    assert_eq!(repair.fixer.calls(), 0);
    let kinds: Vec<LogKind> = session.logs().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![LogKind::Startup, LogKind::Attempt, LogKind::RunnerFailure]
    );
}

#[test]
fn division_by_zero_scenario_end_to_end() {
    let outcomes = vec![
        Ok(ExecutionOutcome::failure(
            vec!["Executing with data: []".to_string()],
            "ZeroDivisionError: division by zero",
        )),
        Ok(ExecutionOutcome::success(vec!["Result computed: 0".to_string()])),
    ];
    let fixed = "def process_data(data):\n    if not data:\n        return 0\n    return sum(data) / len(data)\n\nprint(f\"Result computed: {process_data([])}\")";
    let fixes = vec![Ok(fix_for("main.py", fixed, "guarded empty input"))];

    let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(fixes));
    repair.options.hint = Some("empty lists are valid input".to_string());
    let mut session = SessionState::new(python_project(), 3);
    let original_id = session.files().as_slice()[0].id;

    let (status, observed) = run(&mut repair, &mut session);

    assert_eq!(status, Status::Success);
    assert_eq!(session.retry_count(), 1);
    assert_eq!(session.files().len(), 1);
    assert_eq!(session.files().as_slice()[0].id, original_id);
    assert_eq!(session.files().as_slice()[0].content, fixed);
    assert_eq!(
        session.last_fix().map(|f| f.explanation.as_str()),
        Some("guarded empty input")
    );

    let milestones: Vec<LogKind> = session
        .logs()
        .iter()
        .map(|e| e.kind)
        .filter(|k| matches!(k, LogKind::Attempt | LogKind::FixApplied | LogKind::Success))
        .collect();
    assert_eq!(
        milestones,
        vec![
            LogKind::Attempt,
            LogKind::FixApplied,
            LogKind::Attempt,
            LogKind::Success
        ]
    );
    let applied = session
        .logs()
        .iter()
        .find(|e| e.kind == LogKind::FixApplied)
        .expect("fix should be logged");
    assert!(applied.message.contains("guarded empty input"));
    assert!(
        session
            .logs()
            .iter()
            .any(|e| e.kind == LogKind::Output && e.message == "Result computed: 0")
    );

    let requests = repair.fixer.requests.lock().expect("lock should work");
    assert_eq!(requests[0].0, "ZeroDivisionError: division by zero");
    assert_eq!(requests[0].1.as_deref(), Some("empty lists are valid input"));

    // The observer saw exactly the session log, in order.
    assert_eq!(observed, session.logs());
}

#[test]
fn fix_introducing_a_file_reaches_the_next_attempt() {
    let outcomes = vec![failure("ModuleNotFoundError: utils"), Ok(ExecutionOutcome::success(Vec::new()))];
    let fixes = vec![Ok(fix_for("utils/helpers.py", "def mean(x): return 0", "added helper"))];

    let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(fixes));
    let mut session = SessionState::new(python_project(), 3);
    run(&mut repair, &mut session);

    assert_eq!(session.files().len(), 2);
    let created = &session.files().as_slice()[1];
    assert_eq!((created.path.as_str(), created.name.as_str()), ("utils/", "helpers.py"));
    let seen = repair.remote.seen.lock().expect("lock should work");
    assert!(seen[1].contains("def mean"));
}

#[test]
fn javascript_projects_use_the_local_runner() {
    let mut files = ProjectFileSet::new();
    files.add("lib/util.js", "const x = 1;").expect("add should work");
    files.add("main.js", "console.log(x);").expect("add should work");

    let mut repair = repair_loop(ScriptedSimulator::new(Vec::new()), ScriptedFixer::new(Vec::new()));
    let mut session = SessionState::new(files, 3);
    let (status, _) = run(&mut repair, &mut session);

    assert_eq!(status, Status::Success);
    assert_eq!(repair.remote.calls(), 0);
    assert_eq!(repair.local.sources.len(), 1);
    assert!(repair.local.sources[0].starts_with("// File: lib/util.js\n"));
}

#[test]
fn finished_sessions_require_reset() {
    let outcomes = vec![
        Ok(ExecutionOutcome::success(Vec::new())),
        Ok(ExecutionOutcome::success(Vec::new())),
    ];
    let mut repair = repair_loop(ScriptedSimulator::new(outcomes), ScriptedFixer::new(Vec::new()));
    let mut session = SessionState::new(python_project(), 3);
    run(&mut repair, &mut session);

    let err = repair
        .run(&mut session, &CancelToken::new(), &mut |_: &LogEntry| {})
        .expect_err("terminal sessions must be reset");
    assert_eq!(err, SessionError::ResetRequired(Status::Success));

    session
        .apply(patchloop_core::Event::Reset, chrono::Utc::now())
        .expect("reset should work");
    let (status, _) = run(&mut repair, &mut session);
    assert_eq!(status, Status::Success);
    assert_eq!(repair.remote.calls(), 2);
}

#[test]
fn busy_session_rejects_a_second_run() {
    let mut repair = repair_loop(ScriptedSimulator::new(Vec::new()), ScriptedFixer::new(Vec::new()));
    let mut session = SessionState::new(python_project(), 3);
    let now = chrono::Utc::now();
    session
        .apply(patchloop_core::Event::Start, now)
        .expect("start should work");
    session
        .apply(patchloop_core::Event::AttemptStarted(RunnerKind::Remote), now)
        .expect("attempt should start");
    let logged = session.logs().len();

    let err = repair
        .run(&mut session, &CancelToken::new(), &mut |_: &LogEntry| {})
        .expect_err("a running session must not start again");

    assert_eq!(err, SessionError::Busy(Status::Running));
    assert_eq!(session.status(), Status::Running);
    assert_eq!(session.logs().len(), logged);
    assert_eq!(repair.remote.calls(), 0);
    assert_eq!(repair.fixer.calls(), 0);
}

#[test]
fn cancelled_token_stops_before_first_attempt() {
    let mut repair = repair_loop(ScriptedSimulator::new(Vec::new()), ScriptedFixer::new(Vec::new()));
    let mut session = SessionState::new(python_project(), 3);
    let token = CancelToken::new();
    token.cancel();

    let status = repair
        .run(&mut session, &token, &mut |_: &LogEntry| {})
        .expect("run should start");

    assert_eq!(status, Status::Failed);
    assert_eq!(repair.remote.calls(), 0);
    assert_eq!(session.logs().last().map(|e| e.kind), Some(LogKind::Cancelled));
}

struct CancellingFixer {
    token: CancelToken,
}

impl FixProvider for CancellingFixer {
    fn fix(
        &self,
        _files: &ProjectFileSet,
        _error: &str,
        _hint: Option<&str>,
    ) -> Result<FixSuggestion, ProviderError> {
        self.token.cancel();
        Ok(fix_for("main.py", "print(0)", "late"))
    }
}

#[test]
fn cancellation_during_fix_request_discards_the_fix() {
    let token = CancelToken::new();
    let mut repair = RepairLoop {
        local: ScriptedLocal::default(),
        remote: ScriptedSimulator::new(vec![failure("boom")]),
        fixer: CancellingFixer {
            token: token.clone(),
        },
        options: RepairOptions {
            settle_delay: Duration::ZERO,
            hint: None,
        },
    };
    let mut session = SessionState::new(python_project(), 3);
    let original = session.files().clone();

    let status = repair
        .run(&mut session, &token, &mut |_: &LogEntry| {})
        .expect("run should start");

    assert_eq!(status, Status::Failed);
    assert_eq!(session.retry_count(), 0);
    assert_eq!(session.files(), &original);
    assert_eq!(session.logs().last().map(|e| e.kind), Some(LogKind::Cancelled));
}
