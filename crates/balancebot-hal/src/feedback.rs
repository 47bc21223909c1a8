//! 操作员反馈通道
//!
//! 显示屏和蜂鸣器同时被行为层（仲裁线程）和控制循环（实时线程）使用。
//! 仲裁线程使用阻塞加锁；控制线程只能使用 `try_*` 变体，锁被占用时
//! 跳过本次提示，由调用方在下一个 tick 重试，保证实时线程不阻塞。

use crate::{AudioSignal, Indicator, OperatorDisplay};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::warn;

type SharedDisplay = Arc<Mutex<Box<dyn OperatorDisplay + Send>>>;
type SharedAudio = Arc<Mutex<Box<dyn AudioSignal + Send>>>;

/// 显示屏 + 蜂鸣器的共享句柄（Clone 只复制 Arc 指针）
#[derive(Clone)]
pub struct OperatorFeedback {
    display: SharedDisplay,
    audio: SharedAudio,
}

impl OperatorFeedback {
    pub fn new(
        display: impl OperatorDisplay + Send + 'static,
        audio: impl AudioSignal + Send + 'static,
    ) -> Self {
        let display: Box<dyn OperatorDisplay + Send> = Box::new(display);
        let audio: Box<dyn AudioSignal + Send> = Box::new(audio);
        Self {
            display: Arc::new(Mutex::new(display)),
            audio: Arc::new(Mutex::new(audio)),
        }
    }

    pub fn show_message(&self, text: &str, line: u8) {
        self.with_display(|d| d.show_message(text, line));
    }

    pub fn clear_line(&self, line: u8) {
        self.with_display(|d| d.clear_line(line));
    }

    pub fn clear(&self) {
        self.with_display(|d| d.clear());
    }

    pub fn set_indicator(&self, indicator: Indicator) {
        self.with_display(|d| d.set_indicator(indicator));
    }

    pub fn beep(&self) {
        self.with_audio(|a| a.beep());
    }

    pub fn beep_sequence_up(&self) {
        self.with_audio(|a| a.beep_sequence_up());
    }

    /// 非阻塞告警：显示文本并蜂鸣
    ///
    /// 返回 `false` 表示设备正被其他线程占用，本次未送达。
    pub fn try_alert(&self, text: &str, line: u8) -> bool {
        let shown = match self.display.try_lock() {
            Ok(mut display) => {
                display.show_message(text, line);
                display.set_indicator(Indicator::Warning);
                true
            },
            Err(TryLockError::Poisoned(poisoned)) => {
                let mut display = poisoned.into_inner();
                display.show_message(text, line);
                true
            },
            Err(TryLockError::WouldBlock) => false,
        };
        if !shown {
            return false;
        }

        match self.audio.try_lock() {
            Ok(mut audio) => audio.beep(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().beep(),
            // 文本已显示，蜂鸣丢失可以接受
            Err(TryLockError::WouldBlock) => {},
        }
        true
    }

    /// 非阻塞上升音（控制线程启动提示）
    pub fn try_beep_sequence_up(&self) -> bool {
        match self.audio.try_lock() {
            Ok(mut audio) => {
                audio.beep_sequence_up();
                true
            },
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().beep_sequence_up();
                true
            },
            Err(TryLockError::WouldBlock) => false,
        }
    }

    fn with_display(&self, f: impl FnOnce(&mut Box<dyn OperatorDisplay + Send>)) {
        match self.display.lock() {
            Ok(mut display) => f(&mut *display),
            Err(poisoned) => {
                warn!("Display lock poisoned, recovering");
                let mut display = poisoned.into_inner();
                f(&mut *display);
            },
        }
    }

    fn with_audio(&self, f: impl FnOnce(&mut Box<dyn AudioSignal + Send>)) {
        match self.audio.lock() {
            Ok(mut audio) => f(&mut *audio),
            Err(poisoned) => {
                warn!("Audio lock poisoned, recovering");
                let mut audio = poisoned.into_inner();
                f(&mut *audio);
            },
        }
    }
}

impl std::fmt::Debug for OperatorFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorFeedback").finish_non_exhaustive()
    }
}
