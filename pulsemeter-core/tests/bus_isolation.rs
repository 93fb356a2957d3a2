//! Subscriber failure isolation through the full pipeline
//!
//! A broken display component must never interrupt ingestion, starve other
//! subscribers, or leak pooled records.

mod common;

use pulsemeter_core::{BusEvent, MetricKind, SubscriberError, Topic};

use common::{pet_hit, pipeline, player_hit, recorder};

#[test]
fn panicking_subscriber_does_not_stop_ingestion() {
    let mut pipeline = pipeline();
    pipeline.subscribe(Topic::DamageObserved, "broken", |_| panic!("renderer crashed"));
    let amounts = recorder::<f64>();
    let sink = amounts.clone();
    pipeline.subscribe(Topic::DamageObserved, "healthy", move |event| {
        if let BusEvent::DamageObserved(record) = event {
            sink.borrow_mut().push(record.amount);
        }
        Ok(())
    });

    for i in 0..5 {
        pipeline.ingest(player_hit(i as f64, 10.0 * (i + 1) as f64)).unwrap();
    }

    assert_eq!(*amounts.borrow(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    assert_eq!(pipeline.window_totals(MetricKind::Damage, 60.0).unwrap().total, 150.0);

    let topic = pipeline.bus().topic_stats(Topic::DamageObserved);
    assert_eq!(topic.published, 5);
    assert_eq!(topic.delivered, 5);
    assert_eq!(topic.failures, 5);

    let pool = pipeline.pools().damage.stats();
    assert_eq!(pool.outstanding, 0);
    assert!(pool.is_balanced());
}

#[test]
fn erroring_subscriber_is_counted_per_subscriber() {
    let mut pipeline = pipeline();
    let flaky_calls = recorder::<()>();
    let calls = flaky_calls.clone();
    pipeline.subscribe(Topic::DamageObserved, "flaky", move |_| {
        calls.borrow_mut().push(());
        if calls.borrow().len() % 2 == 0 {
            Err(SubscriberError::failed("every other frame"))
        } else {
            Ok(())
        }
    });

    for i in 0..4 {
        pipeline.ingest(player_hit(i as f64, 1.0)).unwrap();
    }

    let stats = pipeline.bus().subscriber_stats(Topic::DamageObserved);
    assert_eq!(stats[0].label, "flaky");
    assert_eq!(stats[0].delivered, 2);
    assert_eq!(stats[0].failures, 2);
    assert_eq!(pipeline.diagnostics().bus.failures, 2);
}

#[test]
fn failures_on_one_topic_leave_others_alone() {
    let mut pipeline = pipeline();
    pipeline.subscribe(Topic::DamageObserved, "broken", |_| {
        Err(SubscriberError::failed("no"))
    });
    let detected = recorder::<String>();
    let sink = detected.clone();
    pipeline.subscribe(Topic::EntityDetected, "roster", move |event| {
        if let BusEvent::EntityDetected(entity) = event {
            sink.borrow_mut().push(entity.id.clone());
        }
        Ok(())
    });

    pipeline.ingest(pet_hit(1.0, 5.0)).unwrap();
    assert_eq!(detected.borrow().len(), 1);
    assert_eq!(pipeline.bus().topic_stats(Topic::EntityDetected).failures, 0);
}

#[test]
fn unsubscribed_callbacks_stop_receiving() {
    let mut pipeline = pipeline();
    let hits = recorder::<f64>();
    let sink = hits.clone();
    let id = pipeline.subscribe(Topic::DamageObserved, "temp", move |event| {
        if let BusEvent::DamageObserved(record) = event {
            sink.borrow_mut().push(record.amount);
        }
        Ok(())
    });

    pipeline.ingest(player_hit(1.0, 1.0)).unwrap();
    assert!(pipeline.unsubscribe(Topic::DamageObserved, id));
    pipeline.ingest(player_hit(2.0, 2.0)).unwrap();
    assert_eq!(*hits.borrow(), vec![1.0]);
}
