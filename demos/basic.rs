//! Basic usage of the connection pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use slotpool::{Connection, ConnectionFactory, ConnectionHandle, Pool, PoolConfiguration};
use tokio::time::sleep;

struct Session {
    id: usize,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle for Session {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Connector {
    next_id: AtomicUsize,
}

#[async_trait]
impl ConnectionFactory for Connector {
    type Connection = Session;
    type Error = std::io::Error;

    async fn create(&self) -> Result<Session, std::io::Error> {
        // Simulated handshake
        sleep(Duration::from_millis(20)).await;
        Ok(Session {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("slotpool=debug")
        .init();

    println!("=== slotpool - Basic Examples ===\n");

    let pool = Pool::new(
        Connector::default(),
        PoolConfiguration::new().with_max_connections(2),
    )
    .expect("valid configuration");

    // Example 1: Acquire and release
    acquire_release(&pool).await;

    // Example 2: Contention
    contention(&pool).await;

    // Example 3: Dead connection replacement
    replacement(&pool).await;

    // Example 4: Metrics and health
    metrics_and_health(&pool);
}

async fn acquire_release(pool: &Pool<Connector>) {
    println!("1. Acquire and release:");
    let conn = pool.acquire().await.unwrap();
    println!("   Got session {} in {}", conn.id, Connection::slot_id(&conn));
    pool.release(conn);
    println!("   Available after release: {}\n", pool.status().available);
}

async fn contention(pool: &Pool<Connector>) {
    println!("2. Five tasks sharing two connections:");
    let mut handles = Vec::new();
    for task in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            println!("   Task {} got session {}", task, conn.id);
            sleep(Duration::from_millis(30)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    println!("   Sessions created: {}\n", pool.metrics().connections_created);
}

async fn replacement(pool: &Pool<Connector>) {
    println!("3. Dead connection replacement:");
    let conn = pool.acquire().await.unwrap();
    println!("   Closing session {}", conn.id);
    conn.closed.store(true, Ordering::Relaxed);
    drop(conn);

    let conn = pool.acquire().await.unwrap();
    println!("   Got fresh session {}\n", conn.id);
}

fn metrics_and_health(pool: &Pool<Connector>) {
    println!("4. Metrics and health:");
    let health = pool.health();
    println!("   Healthy: {} ({:.0}% utilized)", health.is_healthy(), health.utilization * 100.0);
    for (key, value) in pool.export_metrics() {
        println!("   {}: {}", key, value);
    }
    println!();
    print!("{}", pool.export_metrics_prometheus("demo", None));
}
