#![no_main]

use libfuzzer_sys::fuzz_target;
use opsrelay_bot::{parse_relay_command, RelayCommand};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Some(command) = parse_relay_command(&raw, Some("opsrelay_bot")) else {
        return;
    };
    assert!(!command.log_name().is_empty());

    if let RelayCommand::Run(operation) = command {
        match operation.validate() {
            Ok(Some(argument)) => {
                assert!(operation.kind.requires_argument());
                assert!(!argument.is_empty());
                assert!(!argument.starts_with('-'));
                assert!(!argument
                    .chars()
                    .any(|ch| ch.is_whitespace() || ch.is_control()));
            }
            Ok(None) => assert!(!operation.kind.requires_argument()),
            Err(rejection) => {
                assert!(operation.kind.requires_argument());
                assert!(rejection.usage_hint().contains(&operation.kind.usage()));
            }
        }
    }
});
