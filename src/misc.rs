use std::time::Duration;

use byte_unit::Byte;

#[macro_export]
macro_rules! exit_error {
    ($($arg:tt)+) => {
        {
            let message = format!($($arg)+);
            log::debug!("fatal: {}", message);
            eprintln!("{}", crossterm::style::Stylize::red(message));
            std::process::exit(1)
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2} seconds", elapsed.as_secs_f64())
}

pub fn format_size(bytes: u64) -> String {
    Byte::from_bytes(bytes).get_appropriate_unit(false).to_string()
}

pub fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}
