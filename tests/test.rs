use sluice::config::{Fanout, MaxAttempts, QueueCapacity, RetryBase, RetryJitter, RetryMax, Workers};
use sluice::delivery::{DeadLetterReason, PermanentDeliveryErr, Transport, TransientDeliveryErr, TransportErr};
use sluice::event::Id;
use sluice::resolve::{ActorGraph, GraphErr};
use sluice::{admin, ActorId, ActorRef, Engine, EngineErr, Event, EventKind, RemoteActor, RemoteInbox};

use async_trait::async_trait;
use hashbrown::HashMap;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use warp::http::StatusCode;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn init() {
    let _ = pretty_env_logger::try_init();
}

#[derive(Default)]
struct Graph(HashMap<ActorId, Vec<ActorRef>>);

#[async_trait]
impl ActorGraph for Graph {
    async fn followers(&self, actor: &ActorId) -> Result<Vec<ActorRef>, GraphErr> {
        Ok(self.0.get(actor).cloned().unwrap_or_default())
    }

    fn is_inbox_shared(&self, _actor: &RemoteActor) -> bool {
        true
    }
}

/// A set of remote servers.  Each inbox answers from its own script, then with 200 once
/// the script runs out.  Inboxes listed in `hung` never answer at all, and sending to one
/// listed in `crashing` panics.  `overlapped` is set
/// if one event was ever being sent to one inbox twice at the same time.
#[derive(Default)]
struct Remotes {
    scripts: Mutex<HashMap<Url, VecDeque<StatusCode>>>,
    hung: BTreeSet<Url>,
    crashing: BTreeSet<Url>,
    attempts: Mutex<Vec<(Instant, Url, StatusCode)>>,
    busy: Mutex<HashMap<(Url, u64), usize>>,
    overlapped: Mutex<bool>,
    latency: Option<Duration>,
}

impl Remotes {
    fn script(self, inbox: &str, answers: &[u16]) -> Self {
        let answers = answers
            .iter()
            .map(|code| StatusCode::from_u16(*code).expect("valid status"))
            .collect();
        self.scripts.lock().expect("test mutex").insert(url(inbox), answers);
        self
    }

    fn attempts(&self) -> Vec<(Instant, Url, StatusCode)> {
        self.attempts.lock().expect("test mutex").clone()
    }

    fn attempts_at(&self, inbox: &str) -> Vec<(Instant, StatusCode)> {
        let inbox = url(inbox);
        self.attempts()
            .into_iter()
            .filter(|(_, url, _)| *url == inbox)
            .map(|(at, _, status)| (at, status))
            .collect()
    }

    fn delivered(&self) -> usize {
        self.attempts()
            .iter()
            .filter(|(_, _, status)| status.is_success())
            .count()
    }
}

#[async_trait]
impl Transport for Remotes {
    async fn deliver_signed(&self, inbox: &RemoteInbox, event: &Event) -> Result<StatusCode, TransportErr> {
        if self.hung.contains(&inbox.endpoint) {
            futures::future::pending::<()>().await;
        }
        if self.crashing.contains(&inbox.endpoint) {
            panic!("no signing key for {}", inbox.endpoint);
        }
        {
            let mut busy = self.busy.lock().expect("test mutex");
            let running = busy.entry((inbox.endpoint.clone(), event.seq)).or_insert(0);
            *running += 1;
            if *running > 1 {
                *self.overlapped.lock().expect("test mutex") = true;
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let status = self
            .scripts
            .lock()
            .expect("test mutex")
            .get_mut(&inbox.endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StatusCode::OK);
        *self
            .busy
            .lock()
            .expect("test mutex")
            .get_mut(&(inbox.endpoint.clone(), event.seq))
            .expect("entered above") -= 1;
        self.attempts
            .lock()
            .expect("test mutex")
            .push((Instant::now(), inbox.endpoint.clone(), status));
        Ok(status)
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).expect("valid url")
}

fn remote(host: &str, name: &str, shared: bool) -> ActorRef {
    ActorRef::Remote(RemoteActor {
        id: url(&format!("https://{}/users/{}", host, name)),
        inbox: url(&format!("https://{}/users/{}/inbox", host, name)),
        shared_inbox: if shared {
            Some(url(&format!("https://{}/inbox", host)))
        } else {
            None
        },
    })
}

fn config() -> Fanout {
    Fanout {
        workers: Workers(2),
        retry_jitter: RetryJitter(0.0),
        ..Fanout::default()
    }
}

fn alice() -> ActorId {
    ActorId::Local(Id(1))
}

fn post(seq: u64) -> Event {
    Event::new(seq, EventKind::Create, alice(), format!("https://home.example/statuses/{}", seq))
}

/// Let the workers run until `done` holds, advancing the (paused) clock as needed.
async fn wait_until(what: &str, done: impl Fn() -> bool) -> TestResult {
    for _ in 0..10_000 {
        if done() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(format!("gave up waiting until {}", what).into())
}

#[tokio::test(start_paused = true)]
async fn a_post_reaches_every_inbox_once_and_the_live_session() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(
        alice(),
        vec![
            remote("a.example", "bob", true),
            remote("a.example", "carol", true),
            remote("b.example", "dave", false),
        ],
    );
    let remotes = Arc::new(Remotes::default());
    let engine = Engine::start(&config(), Arc::new(graph), remotes.clone());
    let session = engine.subscribe(Id(1));

    let receipt = engine.submit(post(1)).await?;
    assert_eq!(receipt.remote_tasks.len(), 2);
    assert_eq!(receipt.local_sessions, 1);
    assert_eq!(session.try_recv().map(|event| event.seq), Some(1));

    wait_until("both inboxes have the post", || remotes.delivered() == 2).await?;
    let inboxes: BTreeSet<_> = remotes.attempts().into_iter().map(|(_, url, _)| url).collect();
    let expected: BTreeSet<_> = vec![url("https://a.example/inbox"), url("https://b.example/users/dave/inbox")]
        .into_iter()
        .collect();
    assert_eq!(inboxes, expected);
    assert_eq!(remotes.attempts().len(), 2);
    assert!(engine.dead_letters().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_exponentially_then_succeed() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(alice(), vec![remote("flaky.example", "bob", true)]);
    let remotes = Arc::new(Remotes::default().script("https://flaky.example/inbox", &[503, 503, 503]));
    let engine = Engine::start(&config(), Arc::new(graph), remotes.clone());

    engine.submit(post(1)).await?;
    wait_until("the fourth attempt succeeds", || remotes.delivered() == 1).await?;

    let attempts = remotes.attempts_at("https://flaky.example/inbox");
    let statuses: Vec<u16> = attempts.iter().map(|(_, status)| status.as_u16()).collect();
    assert_eq!(statuses, vec![503, 503, 503, 200]);
    let gaps: Vec<Duration> = attempts.windows(2).map(|pair| pair[1].0 - pair[0].0).collect();
    let base = Duration::from_secs(60);
    assert_eq!(gaps, vec![base, base * 2, base * 4]);

    let stats = engine.stats();
    assert_eq!(stats.queue.ready + stats.queue.delayed + stats.queue.in_flight, 0);
    assert_eq!(stats.dead_letters, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_the_last_allowed_attempt() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(alice(), vec![remote("down.example", "bob", true)]);
    let remotes = Arc::new(Remotes::default().script("https://down.example/inbox", &[503; 10]));
    let cfg = Fanout {
        retry_base: RetryBase(Duration::from_secs(10)),
        retry_max: RetryMax(Duration::from_secs(25)),
        retry_jitter: RetryJitter(0.25),
        max_attempts: MaxAttempts(4),
        ..config()
    };
    let engine = Engine::start(&cfg, Arc::new(graph), remotes.clone());

    engine.submit(post(1)).await?;
    wait_until("the delivery is dead-lettered", || !engine.dead_letters().is_empty()).await?;

    let attempts = remotes.attempts_at("https://down.example/inbox");
    assert_eq!(attempts.len(), 4);
    let gaps: Vec<Duration> = attempts.windows(2).map(|pair| pair[1].0 - pair[0].0).collect();
    assert!(gaps.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", gaps);
    for (gap, backoff) in gaps.iter().zip(&[10, 20, 25]) {
        let backoff = Duration::from_secs(*backoff);
        assert!(*gap >= backoff && *gap <= backoff.mul_f64(1.25), "{:?}", gaps);
    }

    let letters = engine.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 4);
    assert_eq!(
        letters[0].reason,
        DeadLetterReason::Exhausted(TransientDeliveryErr::Status(503))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_gone_inbox_is_dead_lettered_without_affecting_the_others() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(
        alice(),
        vec![remote("gone.example", "bob", true), remote("fine.example", "carol", true)],
    );
    let remotes = Arc::new(Remotes::default().script("https://gone.example/inbox", &[410]));
    let engine = Arc::new(Engine::start(&config(), Arc::new(graph), remotes.clone()));

    engine.submit(post(1)).await?;
    wait_until("the gone inbox is dead-lettered", || engine.dead_letters().len() == 1).await?;
    wait_until("the other inbox has the post", || remotes.delivered() == 1).await?;

    assert_eq!(remotes.attempts_at("https://gone.example/inbox").len(), 1);
    let letters = engine.dead_letters();
    let letter = &letters[0];
    assert_eq!(letter.attempts, 1);
    assert_eq!(letter.inbox.endpoint, url("https://gone.example/inbox"));
    assert_eq!(letter.reason, DeadLetterReason::Rejected(PermanentDeliveryErr::Status(410)));

    let res = warp::test::request()
        .path("/api/v1/fanout/dead_letters")
        .reply(&admin::routes(Arc::clone(&engine)))
        .await;
    assert_eq!(res.status(), 200);
    let listed: serde_json::Value = serde_json::from_slice(res.body())?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], letter.id.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_full_queue_refuses_remote_events_but_not_local_ones() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(alice(), vec![remote("slow.example", "bob", true)]);
    let remotes = Remotes {
        hung: vec![url("https://slow.example/inbox")].into_iter().collect(),
        ..Remotes::default()
    };
    let cfg = Fanout {
        queue_capacity: QueueCapacity(1),
        ..config()
    };
    let engine = Engine::start(&cfg, Arc::new(graph), Arc::new(remotes));
    let session = engine.subscribe(Id(1));

    engine.submit(post(1)).await?;
    match engine.submit(post(2)).await {
        Err(EngineErr::Busy) => (),
        other => panic!("expected Busy, got {:?}", other),
    }

    let mention = Event::new(
        7,
        EventKind::Create,
        ActorId::Remote(url("https://elsewhere.example/users/erin")),
        "https://elsewhere.example/statuses/7",
    )
    .addressed_to(ActorRef::Local(Id(1)));
    let receipt = engine.submit(mention).await?;
    assert!(receipt.remote_tasks.is_empty());
    assert_eq!(receipt.local_sessions, 1);

    // the refused post went nowhere, not even to the live session
    let seen: Vec<u64> = std::iter::from_fn(|| session.try_recv()).map(|e| e.seq).collect();
    assert_eq!(seen, vec![1, 7]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_see_each_origin_in_order() -> TestResult {
    init();
    let engine = Arc::new(Engine::start(&config(), Arc::new(Graph::default()), Arc::new(Remotes::default())));
    let session = engine.subscribe(Id(1));

    let submitters: Vec<_> = (0..4u64)
        .map(|lane| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                for seq in (1..=200u64).filter(|seq| seq % 4 == lane) {
                    engine.submit(post(seq)).await?;
                }
                Ok::<_, EngineErr>(())
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await??;
    }

    let seen: Vec<u64> = std::iter::from_fn(|| session.try_recv()).map(|e| e.seq).collect();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", seen);
    assert_eq!(seen.last(), Some(&200));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_task_is_never_attempted_by_two_workers_at_once() -> TestResult {
    init();
    let followers: Vec<_> = (0..20)
        .map(|n| remote(&format!("host{}.example", n), "bob", true))
        .collect();
    let mut graph = Graph::default();
    graph.0.insert(alice(), followers);

    let mut remotes = Remotes {
        latency: Some(Duration::from_millis(2)),
        ..Remotes::default()
    };
    for n in 0..20 {
        remotes = remotes.script(&format!("https://host{}.example/inbox", n), &[503, 500]);
    }
    let remotes = Arc::new(remotes);
    let cfg = Fanout {
        workers: Workers(8),
        retry_base: RetryBase(Duration::from_millis(5)),
        retry_jitter: RetryJitter(0.25),
        ..config()
    };
    let engine = Engine::start(&cfg, Arc::new(graph), remotes.clone());

    for seq in 1..=3 {
        engine.submit(post(seq)).await?;
    }
    for _ in 0..1_000 {
        if remotes.delivered() == 60 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(remotes.delivered(), 60);
    assert_eq!(remotes.attempts().len(), 60 + 40);
    assert!(!*remotes.overlapped.lock().expect("test mutex"));
    assert!(engine.dead_letters().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closing_a_session_twice_is_harmless() -> TestResult {
    init();
    let engine = Engine::start(&config(), Arc::new(Graph::default()), Arc::new(Remotes::default()));
    let session = engine.subscribe(Id(1));
    let other = engine.subscribe(Id(1));
    assert_eq!(engine.stats().sessions, 2);

    engine.unsubscribe(&session);
    engine.unsubscribe(&session);
    assert!(!session.close());
    assert_eq!(engine.stats().sessions, 1);

    drop(other);
    assert_eq!(engine.stats().sessions, 0);
    engine.submit(post(1)).await?;
    assert!(engine.stats().sessions_per_account.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_keeps_queued_work_and_refuses_new_events() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(alice(), vec![remote("down.example", "bob", true)]);
    let remotes = Arc::new(Remotes::default().script("https://down.example/inbox", &[503]));
    let engine = Engine::start(&config(), Arc::new(graph), remotes.clone());

    engine.submit(post(1)).await?;
    wait_until("the first attempt fails", || remotes.attempts().len() == 1).await?;
    engine.shutdown().await;
    engine.shutdown().await;

    assert_eq!(engine.stats().queue.delayed, 1);
    match engine.submit(post(2)).await {
        Err(EngineErr::ShuttingDown) => (),
        other => panic!("expected ShuttingDown, got {:?}", other),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_panicking_transport_does_not_take_the_workers_down() -> TestResult {
    init();
    let mut graph = Graph::default();
    graph.0.insert(
        alice(),
        vec![remote("bad.example", "bob", true), remote("good.example", "carol", true)],
    );
    let mut remotes = Remotes::default();
    remotes.crashing.insert(url("https://bad.example/inbox"));
    let remotes = Arc::new(remotes);
    let cfg = Fanout {
        max_attempts: MaxAttempts(2),
        ..config()
    };
    let engine = Engine::start(&cfg, Arc::new(graph), remotes.clone());

    engine.submit(post(1)).await?;
    wait_until("the crashing delivery is dead-lettered", || engine.dead_letters().len() == 1).await?;
    let letters = engine.dead_letters();
    assert_eq!(letters[0].inbox.endpoint, url("https://bad.example/inbox"));
    assert_eq!(letters[0].attempts, 2);
    assert_eq!(
        letters[0].reason,
        DeadLetterReason::Exhausted(TransientDeliveryErr::Crashed(
            "no signing key for https://bad.example/inbox".into()
        ))
    );

    for seq in 2..=4 {
        engine.submit(post(seq)).await?;
    }
    wait_until("every post reaches the good inbox", || {
        remotes.attempts_at("https://good.example/inbox").len() == 4
    })
    .await?;
    wait_until("the later crashes are dead-lettered too", || engine.dead_letters().len() == 4).await?;
    assert_eq!(engine.stats().queue.in_flight, 0);
    engine.shutdown().await;
    Ok(())
}
