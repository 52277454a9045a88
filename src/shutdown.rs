use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 调度器和执行器各自订阅一个接收端，触发关闭后所有订阅者都会收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    /// 关闭后置为 None
    shutdown_tx: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }

    /// 订阅关闭信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.shutdown_tx.lock().await.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // 已经关闭：返回一个立即触发的接收端
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    /// 触发关闭，重复调用无效果
    pub async fn shutdown(&self) {
        let Some(tx) = self.shutdown_tx.lock().await.take() else {
            debug!("关闭信号已经发送过");
            return;
        };

        debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
        // 没有订阅者时发送会失败，可以忽略
        let _ = tx.send(());
        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.shutdown_tx.lock().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_all_subscribers_receive_shutdown() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown().await);

        let mut scheduler_rx = manager.subscribe().await;
        let mut executor_rx = manager.subscribe().await;
        manager.shutdown().await;

        assert!(timeout(Duration::from_millis(100), scheduler_rx.recv())
            .await
            .unwrap()
            .is_ok());
        assert!(timeout(Duration::from_millis(100), executor_rx.recv())
            .await
            .unwrap()
            .is_ok());
        assert!(manager.is_shutdown().await);
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_fires_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown().await;

        let mut rx = manager.subscribe().await;

        assert!(timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_double_shutdown_is_a_no_op() {
        let manager = ShutdownManager::new();
        let cloned = manager.clone();

        manager.shutdown().await;
        cloned.shutdown().await;

        assert!(manager.is_shutdown().await);
        assert!(cloned.is_shutdown().await);
    }
}
