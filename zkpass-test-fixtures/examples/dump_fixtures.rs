use serde_json::json;
use zkpass_common::fr_to_hex;
use zkpass_test_fixtures::fixtures;

fn main() {
    let fixtures = fixtures();
    let users: Vec<_> = fixtures
        .users()
        .iter()
        .map(|user| {
            json!({
                "secret": fr_to_hex(&user.secret),
                "secret_hash": fr_to_hex(&user.secret_hash()),
                "fields": user.fields.iter().map(fr_to_hex).collect::<Vec<_>>(),
                "leaf": fr_to_hex(&user.leaf()),
            })
        })
        .collect();

    let payload = json!({
        "verifying_key": serde_json::from_str::<serde_json::Value>(fixtures.vk_json())
            .expect("vk json"),
        "users": users,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&payload).expect("serialize payload")
    );
}
