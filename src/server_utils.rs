use crate::constants::{
    MAX_GROUP_NAME_LEN, MAX_TIMER_SECONDS, MIN_TIMER_SECONDS, TIMER_STEP_SECONDS,
};

pub fn sanitize_group_name(value: &str, index: usize) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return format!("Tim {}", index + 1);
    }
    trimmed.chars().take(MAX_GROUP_NAME_LEN).collect()
}

/// Clamps to the setup slider range and snaps down to its 30 second steps.
pub fn normalize_timer_seconds(value: Option<i64>) -> Option<u32> {
    value.map(|seconds| {
        let clamped = seconds.clamp(MIN_TIMER_SECONDS as i64, MAX_TIMER_SECONDS as i64) as u32;
        clamped - (clamped - MIN_TIMER_SECONDS) % TIMER_STEP_SECONDS
    })
}

pub fn format_timer(seconds: u32) -> String {
    if seconds < 60 {
        return format!("{seconds} detik");
    }
    let minutes = seconds / 60;
    let rest = seconds % 60;
    if rest > 0 {
        format!("{minutes} menit {rest} detik")
    } else {
        format!("{minutes} menit")
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_group_name_applies_trim_default_and_max_len() {
        assert_eq!(sanitize_group_name("", 0), "Tim 1");
        assert_eq!(sanitize_group_name("   ", 2), "Tim 3");
        assert_eq!(sanitize_group_name(" Elang ", 0), "Elang");
        assert_eq!(
            sanitize_group_name("abcdefghijklmnopqrstuvwxyz", 0),
            "abcdefghijklmnopqrstuvwx"
        );
    }

    #[test]
    fn normalize_timer_seconds_clamps_and_snaps() {
        assert_eq!(normalize_timer_seconds(None), None);
        assert_eq!(normalize_timer_seconds(Some(-10)), Some(60));
        assert_eq!(normalize_timer_seconds(Some(90)), Some(90));
        assert_eq!(normalize_timer_seconds(Some(119)), Some(90));
        assert_eq!(normalize_timer_seconds(Some(999)), Some(300));
    }

    #[test]
    fn format_timer_matches_setup_labels() {
        assert_eq!(format_timer(45), "45 detik");
        assert_eq!(format_timer(60), "1 menit");
        assert_eq!(format_timer(150), "2 menit 30 detik");
    }

    #[test]
    fn format_clock_pads_both_fields() {
        assert_eq!(format_clock(90), "01:30");
        assert_eq!(format_clock(5), "00:05");
    }
}
