//! 优先级请求队列 - 基础设施层
//!
//! 同一队列实例上任意时刻只执行一个任务，任务之间强制一个
//! 固定的间隔延迟，避免并发长连接压垮后端。
//! 调度顺序：优先级降序，同优先级按入队先后（FIFO）。
//! 队列为空时调度循环退出，下次入队自动重启。

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

/// 队列任务：一个装箱的延迟计算
pub type QueueTask<T> = Pin<Box<dyn Future<Output = T> + Send>>;

struct QueueItem<T> {
    priority: i32,
    seq: u64,
    enqueued_at: Instant,
    task: QueueTask<T>,
    tx: oneshot::Sender<T>,
}

impl<T> PartialEq for QueueItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for QueueItem<T> {}

impl<T> PartialOrd for QueueItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // 大顶堆：优先级高者先出；同优先级 seq 小者先出
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<T> {
    items: BinaryHeap<QueueItem<T>>,
    dispatching: bool,
    next_seq: u64,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    pacing: Duration,
}

/// 优先级请求队列
///
/// 克隆共享同一个内部队列。
pub struct RequestQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    /// 创建队列
    ///
    /// # 参数
    /// - `pacing`: 相邻两次调度之间的最小间隔
    pub fn new(pacing: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    items: BinaryHeap::new(),
                    dispatching: false,
                    next_seq: 0,
                }),
                pacing,
            }),
        }
    }

    /// 入队一个任务
    ///
    /// # 返回
    /// 一个接收端，任务被调度执行完毕后收到其结果。
    pub fn enqueue(&self, priority: i32, task: QueueTask<T>) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.push(QueueItem {
            priority,
            seq,
            enqueued_at: Instant::now(),
            task,
            tx,
        });
        let start_dispatcher = !state.dispatching;
        if start_dispatcher {
            state.dispatching = true;
        }
        drop(state);

        if start_dispatcher {
            Self::spawn_dispatcher(self.inner.clone());
        }
        rx
    }

    /// 当前排队中的任务数（不含正在执行的）
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_dispatcher(inner: Arc<QueueInner<T>>) {
        tokio::spawn(async move {
            loop {
                let item = {
                    let mut state = inner.state.lock();
                    match state.items.pop() {
                        Some(item) => item,
                        None => {
                            state.dispatching = false;
                            break;
                        }
                    }
                };
                debug!(
                    "调度队列任务，优先级 {}，排队耗时 {:?}",
                    item.priority,
                    item.enqueued_at.elapsed()
                );
                let result = item.task.await;
                // 调用方可能已放弃等待，发送失败直接忽略
                let _ = item.tx.send(result);
                tokio::time::sleep(inner.pacing).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record_task(
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    ) -> QueueTask<&'static str> {
        Box::pin(async move {
            order.lock().push(label);
            label
        })
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_by_priority_then_fifo() {
        let queue: RequestQueue<&'static str> = RequestQueue::new(Duration::from_millis(100));
        let order = Arc::new(Mutex::new(Vec::new()));

        let a = queue.enqueue(1, record_task("A", order.clone()));
        let b = queue.enqueue(5, record_task("B", order.clone()));
        let c = queue.enqueue(1, record_task("C", order.clone()));

        assert_eq!(a.await.unwrap(), "A");
        assert_eq!(b.await.unwrap(), "B");
        assert_eq!(c.await.unwrap(), "C");
        assert_eq!(*order.lock(), vec!["B", "A", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_pacing_interval_between_dispatches() {
        let queue: RequestQueue<tokio::time::Instant> =
            RequestQueue::new(Duration::from_millis(100));

        let first = queue.enqueue(0, Box::pin(async { tokio::time::Instant::now() }));
        let second = queue.enqueue(0, Box::pin(async { tokio::time::Instant::now() }));

        let started_first = first.await.unwrap();
        let started_second = second.await.unwrap();
        assert!(started_second.duration_since(started_first) >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_dispatcher_after_draining() {
        let queue: RequestQueue<&'static str> = RequestQueue::new(Duration::from_millis(100));
        let order = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(0, record_task("first", order.clone()))
            .await
            .unwrap();
        assert!(queue.is_empty());

        // 排空后再次入队应重新启动调度循环
        queue
            .enqueue(0, record_task("second", order.clone()))
            .await
            .unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn task_failures_resolve_the_caller() {
        let queue: RequestQueue<Result<u32, String>> = RequestQueue::new(Duration::from_millis(10));
        let ok = queue.enqueue(0, Box::pin(async { Ok(7) }));
        let err = queue.enqueue(0, Box::pin(async { Err("boom".to_string()) }));
        assert_eq!(ok.await.unwrap(), Ok(7));
        assert_eq!(err.await.unwrap(), Err("boom".to_string()));
    }
}
