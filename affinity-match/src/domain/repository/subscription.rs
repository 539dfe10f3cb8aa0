//! 实时快照订阅
//!
//! 每一项都是完整的当前结果集（不是增量）。第一项是订阅时的状态。
//! `unsubscribe` 或 drop 之后不会再产生任何数据，后端监听器只释放一次。

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};

type CancelFn = Box<dyn FnOnce() + Send>;

pub struct Subscription<T> {
    stream: Option<BoxStream<'static, T>>,
    cancel: Option<CancelFn>,
}

impl<T: 'static> Subscription<T> {
    pub fn new<S, F>(stream: S, on_cancel: F) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
            cancel: Some(Box::new(on_cancel)),
        }
    }

    /// 转换快照类型，取消语义保持不变
    pub fn map<U, F>(mut self, f: F) -> Subscription<U>
    where
        U: 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Subscription {
            stream: self.stream.take().map(|s| s.map(f).boxed()),
            cancel: self.cancel.take(),
        }
    }
}

impl<T> Subscription<T> {
    /// 取消订阅，重复调用无副作用
    pub fn unsubscribe(&mut self) {
        self.stream = None;
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        match this.stream.as_mut() {
            Some(stream) => {
                let polled = stream.poll_next_unpin(cx);
                if let Poll::Ready(None) = polled {
                    // 后端关闭了监听，视同取消
                    this.unsubscribe();
                }
                polled
            }
            None => Poll::Ready(None),
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn test_cancel_runs_exactly_once() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        let mut sub = Subscription::new(stream::iter(vec![1, 2, 3]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(sub.next().await, Some(1));
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(sub.next().await, None);
        drop(sub);

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_map_keeps_cancellation() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        let sub = Subscription::new(stream::iter(vec![1, 2]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut mapped = sub.map(|n| n * 10);
        assert_eq!(mapped.next().await, Some(10));
        assert_eq!(cancels.load(Ordering::SeqCst), 0);

        drop(mapped);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_stream_releases_listener() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        let mut sub = Subscription::new(stream::iter(vec![7]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(sub.next().await, Some(7));
        assert_eq!(sub.next().await, None);
        assert!(!sub.is_active());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }
}
