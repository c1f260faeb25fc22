use std::sync::{Arc, Mutex};

use anyhow::bail;
use serde_json::{json, Value};
use stapel::{CallTask, MultiTask, Scheduler, Task};

fn fetch(uid: i64) -> Task {
    CallTask::new("fetch")
        .task_key(uid.to_string())
        .payload(json!(uid))
        .into()
}

/// `fetch` handler that counts every task instance it is ever given.
fn register_counting_fetch(scheduler: &Scheduler) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0usize));
    let seen = count.clone();
    scheduler.register_fn("fetch", move |_batch_key, tasks, out| {
        *seen.lock().unwrap() += tasks.len();
        for (id, task) in tasks {
            let uid = match &task {
                Task::Call(call) => call.params().as_i64().unwrap(),
                other => bail!("Unexpected {} task in fetch batch", other.kind()),
            };
            out.insert(id, json!({ "uid": uid }));
        }
        Ok(())
    });
    count
}

#[test]
fn progression_output_coalesces_with_earlier_phase() {
    let scheduler = Scheduler::new();
    let fetches = register_counting_fetch(&scheduler);
    scheduler.register_fn("lookup", |_batch_key, tasks, out| {
        for (id, _task) in tasks {
            out.insert(id, json!(7));
        }
        Ok(())
    });

    // Phase 1 batches the lookup and b's fetch; phase 2's progression
    // produces fetch(7), which reuses b's already-settled execution.
    let sequence = Task::sequence(
        CallTask::new("lookup").payload(json!("bob")).into(),
        |uid| Some(fetch(uid.as_i64().unwrap())),
    );

    let mut multi = MultiTask::new();
    multi.insert("a", sequence).unwrap();
    multi.insert("b", fetch(7)).unwrap();
    let tree = multi.execute(&scheduler).unwrap();

    assert_eq!(tree.get("a").unwrap().value(), Some(&json!({ "uid": 7 })));
    assert_eq!(tree.get("a").unwrap().value(), tree.get("b").unwrap().value());
    assert_eq!(*fetches.lock().unwrap(), 1, "fetch(7) must execute at most once");
}

#[test]
fn coalescing_against_a_sequence_base_keeps_its_value() {
    let scheduler = Scheduler::new();
    let fetches = register_counting_fetch(&scheduler);

    // `a` advances past its base; `b` coalesced with that base and must
    // still observe the base's own result.
    let sequence = Task::sequence(fetch(7), |_record| {
        Some(Task::simple(|| json!("advanced")))
    });

    let mut multi = MultiTask::new();
    multi.insert("a", sequence).unwrap();
    multi.insert("b", fetch(7)).unwrap();
    let tree = multi.execute(&scheduler).unwrap();

    assert_eq!(tree.get("a").unwrap().value(), Some(&json!("advanced")));
    assert_eq!(tree.get("b").unwrap().value(), Some(&json!({ "uid": 7 })));
    assert_eq!(*fetches.lock().unwrap(), 1);
}

#[test]
fn sequence_base_can_reuse_prior_result() {
    let scheduler = Scheduler::new();
    let fetches = register_counting_fetch(&scheduler);

    // Both slots share the fetch execution; the sequence's continuation
    // still runs, fed from the coalesced result.
    let sequence = Task::sequence(fetch(7), |record| {
        let uid = record.get("uid").unwrap().as_i64().unwrap();
        Some(Task::simple(move || json!(uid * 10)))
    });

    let mut multi = MultiTask::new();
    multi.insert("plain", fetch(7)).unwrap();
    multi.insert("derived", sequence).unwrap();
    let tree = multi.execute(&scheduler).unwrap();

    assert_eq!(tree.get("plain").unwrap().value(), Some(&json!({ "uid": 7 })));
    assert_eq!(tree.get("derived").unwrap().value(), Some(&json!(70)));
    assert_eq!(*fetches.lock().unwrap(), 1);
}

#[test]
fn progression_may_return_a_multi_task() {
    let scheduler = Scheduler::new();
    register_counting_fetch(&scheduler);

    let sequence = Task::sequence(fetch(7), |record| {
        let uid = record.get("uid").unwrap().as_i64().unwrap();
        let mut followup = MultiTask::new();
        followup.insert("id", Task::simple(move || json!(uid))).unwrap();
        followup
            .insert("label", Task::simple(|| json!("user")))
            .unwrap();
        Some(followup.into())
    });

    let mut multi = MultiTask::new();
    multi.insert("user", sequence).unwrap();
    let tree = multi.execute(&scheduler).unwrap();

    let user = tree.get("user").unwrap();
    assert_eq!(user.get("id").unwrap().value(), Some(&json!(7)));
    assert_eq!(user.get("label").unwrap().value(), Some(&json!("user")));
}

#[test]
fn sequence_over_a_multi_base_is_rejected() {
    let scheduler = Scheduler::new();

    let mut base = MultiTask::new();
    base.insert("x", Task::simple(|| json!(1))).unwrap();
    let sequence = Task::sequence(base.into(), |_| None);

    let mut multi = MultiTask::new();
    multi.insert("bad", sequence).unwrap();

    let err = multi.execute(&scheduler).unwrap_err();
    assert!(err.to_string().contains("multi-task"), "got: {}", err);
}

#[test]
fn missing_handler_aborts_the_run() {
    let scheduler = Scheduler::new();

    let mut multi = MultiTask::new();
    multi.insert("a", CallTask::new("nowhere")).unwrap();

    let err = multi.execute(&scheduler).unwrap_err();
    assert!(err.to_string().contains("Handler not found"), "got: {}", err);
}

#[test]
fn handler_error_propagates_unchanged() {
    let scheduler = Scheduler::new();
    scheduler.register_fn("flaky", |_batch_key, _tasks, _out| bail!("backend down"));

    let mut multi = MultiTask::new();
    multi.insert("a", CallTask::new("flaky")).unwrap();

    let err = multi.execute(&scheduler).unwrap_err();
    assert!(err.to_string().contains("backend down"), "got: {}", err);
}

#[test]
fn omitted_results_are_filled_with_null() {
    let scheduler = Scheduler::new();
    scheduler.register_fn("partial", |_batch_key, tasks, out| {
        for (id, task) in tasks {
            let answer = match &task {
                Task::Call(call) => call.params().as_bool().unwrap(),
                other => bail!("Unexpected {} task", other.kind()),
            };
            if answer {
                out.insert(id, json!("answered"));
            }
        }
        Ok(())
    });

    let mut multi = MultiTask::new();
    multi.insert("kept", CallTask::new("partial").payload(json!(true))).unwrap();
    multi.insert("dropped", CallTask::new("partial").payload(json!(false))).unwrap();
    let tree = multi.execute(&scheduler).unwrap();

    assert_eq!(tree.get("kept").unwrap().value(), Some(&json!("answered")));
    assert_eq!(tree.get("dropped").unwrap().value(), Some(&Value::Null));
}

#[test]
fn phase_cap_stops_runaway_progressions() {
    fn endless() -> Task {
        Task::sequence(Task::simple(|| json!(0)), |_| Some(endless()))
    }

    let scheduler = Scheduler::new().with_max_phases(5);
    let mut multi = MultiTask::new();
    multi.insert("loop", endless()).unwrap();

    let err = multi.execute(&scheduler).unwrap_err();
    assert!(err.to_string().contains("5 phases"), "got: {}", err);
}

#[test]
fn duplicate_caller_keys_are_rejected() {
    let mut multi = MultiTask::new();
    multi.insert("a", Task::simple(|| json!(1))).unwrap();
    let err = multi.insert("a", Task::simple(|| json!(2))).unwrap_err();
    assert!(err.to_string().contains("Duplicate caller key"), "got: {}", err);
}

#[test]
fn multi_task_is_not_directly_executable() {
    let scheduler = Scheduler::new();
    let multi = MultiTask::new();
    let err = scheduler.run_task(multi.into()).unwrap_err();
    assert!(err.to_string().contains("not directly executable"), "got: {}", err);
}
