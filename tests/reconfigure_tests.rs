mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kvroute::{KvRequest, RoutingError};
use support::*;

#[tokio::test]
async fn duplicate_and_stale_revisions_are_ignored() {
    let agent = parked_agent(&sharded_document(5, &["n0:11210", "n1:11210"], 8)).await;

    agent.update_topology(Some(&sharded_document(5, &["x0:11210", "x1:11210"], 8)));
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.rev(), 5);
    assert_eq!(snapshot.pipelines().get(0).unwrap().address(), "n0:11210");

    agent.update_topology(Some(&sharded_document(4, &["x0:11210", "x1:11210"], 8)));
    assert_eq!(agent.routing_snapshot().unwrap().rev(), 5);

    // a strictly newer revision installs
    agent.update_topology(Some(&sharded_document(6, &["x0:11210", "x1:11210"], 8)));
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.rev(), 6);
    assert_eq!(snapshot.pipelines().get(0).unwrap().address(), "x0:11210");
}

#[tokio::test]
async fn unversioned_documents_always_apply() {
    let agent = parked_agent(&sharded_document(3, &["n0:11210"], 8)).await;
    agent.update_topology(Some(&sharded_document(0, &["x0:11210"], 8)));
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.rev(), 0);
    assert_eq!(snapshot.pipelines().get(0).unwrap().address(), "x0:11210");
}

#[tokio::test]
async fn changed_vbucket_count_is_rejected_wholesale() {
    let agent = parked_agent(&sharded_document(1, &["n0:11210"], 8)).await;
    assert_eq!(agent.num_vbuckets(), 8);

    agent.update_topology(Some(&sharded_document(2, &["x0:11210"], 16)));
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.rev(), 1);
    assert_eq!(snapshot.pipelines().get(0).unwrap().address(), "n0:11210");

    // the same revision with the agreed vbucket count still installs
    agent.update_topology(Some(&sharded_document(2, &["x0:11210"], 8)));
    assert_eq!(agent.routing_snapshot().unwrap().rev(), 2);
}

#[tokio::test]
async fn refresh_without_a_document_keeps_the_installed_routing() {
    let agent = parked_agent(&sharded_document(5, &["n0:11210"], 8)).await;
    agent.update_topology(None);
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.rev(), 5);
    assert!(!agent.is_closed());
}

#[tokio::test]
async fn invalid_document_closes_the_whole_agent() {
    let addresses = dead_addresses(1).await;
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let agent = parked_agent(&sharded_document(1, &refs, 8)).await;

    let log = CompletionLog::new();
    agent
        .dispatch_direct(KvRequest::new(None, -1, Vec::new(), log.callback("parked")))
        .unwrap();

    let mut invalid = sharded_document(2, &refs, 8);
    invalid.nodes.clear();
    agent.update_topology(Some(&invalid));

    assert!(agent.is_closed());
    assert!(agent.routing_snapshot().is_none());
    // the parked request terminated with Shutdown, exactly once
    assert_eq!(log.results(), vec![("parked", Err(RoutingError::Shutdown))]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_never_install_out_of_order() {
    let agent = Arc::new(parked_agent(&sharded_document(1, &["n0:11210", "n1:11210"], 8)).await);

    let stop = Arc::new(AtomicBool::new(false));
    let observer = {
        let agent = Arc::clone(&agent);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut last = 0;
            let mut observed = Vec::new();
            while !stop.load(Ordering::SeqCst) {
                if let Some(snapshot) = agent.routing_snapshot() {
                    let rev = snapshot.rev();
                    assert!(rev >= last, "revision went backwards: {last} -> {rev}");
                    last = rev;
                    observed.push(rev);
                }
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    // interleaved submission order; the installed revision must only grow
    let revisions = [9, 2, 17, 5, 20, 3, 12, 8, 19, 4, 15, 6, 18, 7, 11, 10, 16, 13, 14];
    let mut tasks = Vec::new();
    for rev in revisions {
        let agent = Arc::clone(&agent);
        tasks.push(tokio::spawn(async move {
            agent.update_topology(Some(&sharded_document(rev, &["n0:11210", "n1:11210"], 8)));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    stop.store(true, Ordering::SeqCst);
    observer.await.unwrap();
    assert_eq!(agent.routing_snapshot().unwrap().rev(), 20);
}

#[tokio::test]
async fn drained_requests_terminate_in_submission_order() {
    let addresses = dead_addresses(3).await;
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let agent = parked_agent(&sharded_document(1, &refs, 8)).await;

    // four requests spread over two retiring pipelines, in a known
    // submission order
    let log = CompletionLog::new();
    for (tag, replica) in [("first", -2), ("second", -3), ("third", -2), ("fourth", -3)] {
        agent
            .dispatch_direct(KvRequest::new(None, replica, Vec::new(), log.callback(tag)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(log.len(), 0);

    // the successor topology has a single node, so every drained request
    // fails resolution during the requeue
    agent.update_topology(Some(&sharded_document(2, &refs[..1], 8)));

    let results = log.results();
    assert_eq!(
        results.iter().map(|(tag, _)| *tag).collect::<Vec<_>>(),
        vec!["first", "second", "third", "fourth"]
    );
    for (_, result) in results {
        assert!(matches!(result, Err(RoutingError::InvalidServer(_))));
    }
}

#[tokio::test]
async fn drained_requests_redistribute_onto_the_new_topology() {
    let addresses = dead_addresses(3).await;
    let old_refs: Vec<&str> = addresses[..2].iter().map(String::as_str).collect();
    let agent = parked_agent(&sharded_document(1, &old_refs, 8)).await;
    let old_snapshot = agent.routing_snapshot().unwrap();

    let log = CompletionLog::new();
    agent
        .dispatch_direct(KvRequest::new(None, -1, Vec::new(), log.callback("to-0")))
        .unwrap();
    agent
        .dispatch_direct(KvRequest::new(None, -2, Vec::new(), log.callback("to-1")))
        .unwrap();

    // node 0 is retired, node 1 persists, node 2 is new
    let new_refs: Vec<&str> = addresses[1..].iter().map(String::as_str).collect();
    agent.update_topology(Some(&sharded_document(2, &new_refs, 8)));

    // nothing terminated: both requests moved onto the new pipelines
    assert_eq!(log.len(), 0);
    let snapshot = agent.routing_snapshot().unwrap();
    assert_eq!(snapshot.pipelines().get(0).unwrap().queued_len(), 1);
    assert_eq!(snapshot.pipelines().get(1).unwrap().queued_len(), 1);

    // the retiring pipelines are closed and empty
    for index in 0..old_snapshot.pipelines().len() {
        let pipeline = old_snapshot.pipelines().get(index).unwrap();
        assert!(pipeline.is_closed());
        assert_eq!(pipeline.queued_len(), 0);
    }
}
