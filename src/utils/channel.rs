use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::pipeline::router::Event;

/// Batches waiting for the router. Reading stalls once this many are queued.
const BUFFER_SIZE: usize = 50;

pub fn run() -> (Sender<Vec<Event>>, Receiver<Vec<Event>>) {
    mpsc::channel(BUFFER_SIZE)
}
