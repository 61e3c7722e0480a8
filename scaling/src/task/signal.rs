use tokio::sync::watch;

/// 作业下发给任务的运行信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Running,
    Stop,
}

/// 任务侧的停止信号。
///
/// Dumper 在批次之间、Importer 在每批提交之后检查；阻塞在通道上时通过 `stopped()` 唤醒。
/// 发送端被丢弃视同停止。
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<RunSignal>,
}

impl StopSignal {
    pub fn channel() -> (watch::Sender<RunSignal>, StopSignal) {
        let (tx, rx) = watch::channel(RunSignal::Running);
        (tx, StopSignal { rx })
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() == RunSignal::Stop || self.rx.has_changed().is_err()
    }

    /// 等待停止信号
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|s| *s == RunSignal::Stop).await;
    }
}
