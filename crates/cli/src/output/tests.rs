use serde_json::json;

use super::*;

#[test]
fn success_envelope_omits_error() {
	let result = CommandResult::success(
		"ensure",
		EnsureData {
			path: "/rpcx/Arith".to_string(),
		},
	)
	.with_duration_ms(3);
	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(
		value,
		json!({ "ok": true, "command": "ensure", "data": { "path": "/rpcx/Arith" }, "durationMs": 3 })
	);
}

#[test]
fn failure_envelope_uses_screaming_codes() {
	let result = CommandResult::<()>::failure(
		"register",
		CommandError {
			code: ErrorCode::ConnectFailed,
			message: "no server".to_string(),
		},
	);
	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["ok"], false);
	assert_eq!(value["error"]["code"], "CONNECT_FAILED");
	assert!(value.get("data").is_none());
	assert_eq!(render_text(&result), "Error [CONNECT_FAILED]: no server");
}

#[test]
fn check_payload_omits_missing_stat() {
	let data = CheckData {
		path: "/rpcx/Arith/127.0.0.1:8972".to_string(),
		registered: false,
		stat: None,
	};
	let value = serde_json::to_value(&data).unwrap();
	assert_eq!(value, json!({ "path": "/rpcx/Arith/127.0.0.1:8972", "registered": false }));
}
