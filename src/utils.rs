use crate::types::LogMessage;
use crossterm::style::{Color, Stylize};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub raw: bool,
    pub timestamps: bool,
    pub color: bool,
}

/// Generate a color for a string based on hash.
pub fn get_color(s: &str) -> Color {
    let colors = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Magenta,
        Color::Cyan,
        Color::AnsiValue(91),
        Color::AnsiValue(92),
        Color::AnsiValue(94),
        Color::AnsiValue(93),
        Color::AnsiValue(95),
        Color::AnsiValue(96),
    ];
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    let hash = hasher.finish() as u32;
    colors[(hash % colors.len() as u32) as usize]
}

/// Render one log line for stdout.
pub fn format_line(msg: &LogMessage, opts: OutputOptions) -> String {
    if opts.raw {
        return msg.line.clone();
    }

    let prefix = format!("[{}/{}/{}]", msg.namespace, msg.pod_name, msg.container_name);
    let prefix = if opts.color {
        let color = get_color(&format!("{}/{}", msg.namespace, msg.pod_name));
        prefix.with(color).to_string()
    } else {
        prefix
    };

    match msg.timestamp.filter(|_| opts.timestamps) {
        Some(ts) => format!(
            "{} {} {}",
            prefix,
            ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            msg.line
        ),
        None => format!("{} {}", prefix, msg.line),
    }
}
