use bluetui_core::{AdapterInfo, Device};

/// Orders devices by name, then address, for stable listings.
pub fn sorted(mut devices: Vec<Device>) -> Vec<Device> {
    devices.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.address().cmp(b.address())));
    devices
}

pub fn device_lines(devices: Vec<Device>) -> Vec<String> {
    sorted(devices)
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let mut line = format!("[{}] {} ({})", i + 1, d.name(), d.address());
            let flags = device_flags(d);
            if !flags.is_empty() {
                line.push_str(&format!(" [{}]", flags.join(", ")));
            }
            line
        })
        .collect()
}

fn device_flags(device: &Device) -> Vec<&'static str> {
    [
        (device.is_paired(), "paired"),
        (device.is_trusted(), "trusted"),
        (device.is_connected(), "connected"),
    ]
    .into_iter()
    .filter_map(|(set, label)| set.then_some(label))
    .collect()
}

pub fn adapter_line(info: &AdapterInfo) -> String {
    format!(
        "{} ({}) powered: {}",
        info.name,
        info.address,
        if info.powered { "yes" } else { "no" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lines_sorted_by_name() {
        let lines = device_lines(vec![
            Device::new("Speaker", "BB:BB", "/dev_2"),
            Device::new("Keyboard", "AA:AA", "/dev_1"),
        ]);
        assert_eq!(lines, vec!["[1] Keyboard (AA:AA)", "[2] Speaker (BB:BB)"]);
    }

    #[test]
    fn test_adapter_line() {
        let info = AdapterInfo {
            address: "00:1A:7D:DA:71:13".to_string(),
            name: "laptop".to_string(),
            powered: false,
        };
        assert_eq!(adapter_line(&info), "laptop (00:1A:7D:DA:71:13) powered: no");
    }
}
