use basalt_core::Document;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One mutation event, published per affected document in
/// exclusive-lock order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub collection: String,
    pub id: String,
    /// Post-image for inserts and updates; `None` for deletes.
    pub doc: Option<Document>,
}

/// Fan-out of change events to any number of subscribers.
///
/// Sends never block (unbounded channels); subscribers whose receiver
/// has been dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub(crate) struct ChangePublisher {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl ChangePublisher {
    pub(crate) fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;

    #[test]
    fn subscribers_receive_in_order() {
        let publisher = ChangePublisher::default();
        let rx = publisher.subscribe();

        for (i, op) in [ChangeOp::Insert, ChangeOp::Update, ChangeOp::Delete]
            .into_iter()
            .enumerate()
        {
            publisher.publish(ChangeEvent {
                op,
                collection: "c".into(),
                id: i.to_string(),
                doc: Some(doc! { "i": (i as i64) }),
            });
        }

        let ops: Vec<ChangeOp> = rx.try_iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![ChangeOp::Insert, ChangeOp::Update, ChangeOp::Delete]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let publisher = ChangePublisher::default();
        let rx = publisher.subscribe();
        drop(rx);
        let rx2 = publisher.subscribe();

        publisher.publish(ChangeEvent {
            op: ChangeOp::Insert,
            collection: "c".into(),
            id: "1".into(),
            doc: None,
        });
        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(rx2.try_iter().count(), 1);
    }
}
