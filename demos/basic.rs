//! Basic usage of the work broker, in-process

use esox_workbroker::{BrokerConfiguration, Command, Event, Instance, Session};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    println!("=== Esox WorkBroker - Basic Examples ===\n");

    // Example 1: Direct session calls
    direct_sessions();

    // Example 2: Running session loop
    running_session().await;
}

fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn direct_sessions() {
    println!("1. Direct Sessions:");
    let instance = Arc::new(Instance::new());

    let producer = Session::new(Arc::clone(&instance), "jobs", 0);
    producer.queue("g1", &strings(&["x1", "x2"]));
    producer.queue("g2", &strings(&["y1"]));

    let mut worker = Session::new(Arc::clone(&instance), "jobs", 2);
    println!("   Claimed: {:?}", worker.dequeue());
    worker.release(&strings(&["x1"]));
    worker.requeue(&strings(&["x2"]));

    if let Some(metrics) = instance.metrics("jobs") {
        println!(
            "   Size: {}, queued: {}, claimed: {}\n",
            metrics.size, metrics.queued_objects, metrics.claimed_objects
        );
    }
}

async fn running_session() {
    println!("2. Running Session:");
    let instance = Arc::new(Instance::new());
    let config = BrokerConfiguration::default();

    let mut worker = Session::start(Arc::clone(&instance), "jobs", 3, &config);
    worker
        .send(Command::Queue {
            group: "batch".to_string(),
            objects: strings(&["a", "b", "c", "d"]),
        })
        .await
        .ok();

    for _ in 0..2 {
        match worker.recv_event().await {
            Some(Event::Load { size }) => println!("   Elected marker at size {size}"),
            Some(Event::Claim { objects }) => println!("   Claimed: {objects:?}"),
            None => break,
        }
    }

    worker.cancel();
    worker.join().await.ok();
    println!("   Pools left: {:?}\n", instance.pool_names());
}
