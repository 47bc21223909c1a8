//! 前进行为（最低优先级）
//!
//! 只请求一次控制：启动控制线程并设置默认速度/转向。之后永远让出控制权。

use crate::error::BehaviorError;
use balancebot_driver::BalanceLoop;
use tracing::info;

pub struct Forward {
    balance_loop: BalanceLoop,
    started: bool,
}

impl Forward {
    pub const NAME: &'static str = "forward";

    pub fn new(balance_loop: BalanceLoop) -> Self {
        Self {
            balance_loop,
            started: false,
        }
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn wants_control(&mut self) -> bool {
        !self.started
    }

    /// 启动控制线程（幂等），设置默认速度和零转向
    pub fn act(&mut self) -> Result<(), BehaviorError> {
        self.balance_loop.start()?;
        self.balance_loop.restore_defaults();
        if !self.started {
            info!(
                "Driving forward at default speed {}",
                self.balance_loop.config().default_speed
            );
        }
        self.started = true;
        Ok(())
    }

    pub fn suppress(&mut self) {}
}
