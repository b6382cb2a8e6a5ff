//! Trigger-to-delivery flow across the web and mailer components, over the
//! in-memory broker and transport.

use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, Consumer, InMemoryBroker, MessageKind};
use common::queues;
use domain::{Email, InMemorySubscriptionRepository, StaticRateService, SubscriptionStatus};
use mailer::{InMemoryMailTransport, ManualTrigger, RateEmailsHandler, Scheduler, WorkerPool};
use server::fanout::FanOutCoordinator;

async fn wait_for_attempts(transport: &InMemoryMailTransport, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while transport.attempts() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {} of {expected} deliveries attempted",
            transport.attempts()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn confirmed(repo: &InMemorySubscriptionRepository, emails: &[&str]) {
    for raw in emails {
        repo.insert_with_status(&Email::parse(raw).unwrap(), SubscriptionStatus::Confirmed)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_trigger_cycle_delivers_rate_to_each_confirmed_subscriber() {
    let broker = Arc::new(InMemoryBroker::new());
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    confirmed(&subscriptions, &["a@x.com", "b@x.com"]).await;
    subscriptions
        .insert_with_status(
            &Email::parse("pending@x.com").unwrap(),
            SubscriptionStatus::Pending,
        )
        .await
        .unwrap();

    // Web service: answers triggers with rate batches.
    let fanout = Arc::new(FanOutCoordinator::new(
        Arc::clone(&subscriptions),
        Arc::new(StaticRateService::new(27.5)),
        broker::Producer::new(Arc::clone(&broker)),
    ));
    let _web = Consumer::new(Arc::clone(&broker), queues::TRIGGER_EMAILS_SENDING)
        .handler(MessageKind::StartEmailSending, fanout)
        .start_listening()
        .await
        .unwrap();

    // Mailer service: scheduler plus rate-emails consumer feeding the pool.
    let transport = InMemoryMailTransport::new();
    let shared = transport.clone();
    let pool = Arc::new(WorkerPool::start(3, move |_| Ok(shared.clone())).unwrap());
    let handler = Arc::new(RateEmailsHandler::new(Arc::clone(&pool)));
    let _mailer = Consumer::new(Arc::clone(&broker), queues::RATE_EMAILS)
        .handler(MessageKind::RateEmails, handler)
        .start_listening()
        .await
        .unwrap();

    let (trigger, tick) = ManualTrigger::channel();
    let scheduler = tokio::spawn(
        Scheduler::new(trigger, Arc::clone(&broker)).run(std::future::pending()),
    );

    tick.fire().await;
    wait_for_attempts(&transport, 2).await;

    let mut recipients: Vec<String> = transport
        .sent()
        .await
        .into_iter()
        .map(|sent| {
            assert!(sent.email.plain_body.contains("27.5"));
            sent.recipient
        })
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["a@x.com", "b@x.com"]);

    drop(tick);
    assert_eq!(scheduler.await.unwrap(), 1);
    pool.shutdown().await;
    broker.close().await.unwrap();
}
