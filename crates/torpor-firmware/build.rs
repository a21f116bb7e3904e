//! Links against esp-hal's memory layout and forwards `TORPOR_*` entries
//! from a `.env` file to the compiler, keeping station credentials out of
//! the repository.

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=TORPOR_WIFI_SSID");
    println!("cargo:rerun-if-env-changed=TORPOR_WIFI_PASS");

    let mut have_ssid = std::env::var_os("TORPOR_WIFI_SSID").is_some_and(|v| !v.is_empty());
    if let Ok(entries) = dotenvy::dotenv_iter() {
        for (key, value) in entries.flatten() {
            if key.starts_with("TORPOR_") {
                have_ssid |= key == "TORPOR_WIFI_SSID" && !value.is_empty();
                println!("cargo:rustc-env={key}={value}");
            }
        }
    }

    if !have_ssid {
        println!(
            "cargo:warning=TORPOR_WIFI_SSID is not set: network time and the operator page \
             (last reading, CSV download, set time) stay disabled on the device"
        );
    }
}
