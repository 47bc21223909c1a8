//! 终端上的显示屏和蜂鸣器

use balancebot_sdk::hal::{AudioSignal, Indicator, OperatorDisplay};

pub struct ConsoleDisplay;

impl OperatorDisplay for ConsoleDisplay {
    fn show_message(&mut self, text: &str, line: u8) {
        eprintln!("[lcd:{}] {}", line, text);
    }

    fn clear_line(&mut self, line: u8) {
        eprintln!("[lcd:{}] <cleared>", line);
    }

    fn clear(&mut self) {
        eprintln!("[lcd] <cleared>");
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        eprintln!("[led] {:?}", indicator);
    }
}

pub struct ConsoleAudio;

impl AudioSignal for ConsoleAudio {
    fn beep(&mut self) {
        eprintln!("[buzzer] beep");
    }

    fn beep_sequence_up(&mut self) {
        eprintln!("[buzzer] beep-beep-BEEP");
    }
}
