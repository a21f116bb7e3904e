//! Home page of the interaction window
//!
//! Shows the last persisted reading with the time it was measured, a history
//! table the browser fills from [`DOWNLOAD_PATH`], and the set-time form.

use alloc::string::String;
use core::fmt::{self, Write};

use crate::hal::Reading;

/// Streams the raw CSV log
pub const DOWNLOAD_PATH: &str = "/download";
/// Takes the `Y`, `M`, `D`, `h` and `m` form fields
pub const SET_TIME_PATH: &str = "/set_time";

const HEAD: &str = "<!DOCTYPE html><html><head><title>torpor</title>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<style>\
body{font-family:sans-serif;text-align:center;margin:20px;background:#f4f7f6;color:#333}\
.card{max-width:800px;margin:0 auto 20px;background:#fff;padding:20px;border-radius:12px}\
.val{font-size:2.2em;font-weight:bold;color:#3498db}\
.at{font-size:.85rem;color:#888;font-style:italic}\
.scroll{max-height:400px;overflow-y:auto}\
table{width:100%;border-collapse:collapse}td,th{padding:8px;border-bottom:1px solid #eee}\
input{padding:10px;margin:4px}\
</style></head><body><h2>torpor environment logger</h2>";

/// Fills `#history` from the CSV, newest row first
const HISTORY_SCRIPT: &str = "<script>\
fetch('/download').then(r=>{if(!r.ok)throw 0;return r.text()}).then(csv=>{\
const lines=csv.trim().split('\\n');const el=document.getElementById('history');\
if(lines.length<2){el.textContent='No data logged yet.';return}\
let h='<table><tr>'+lines[0].split(',').map(c=>'<th>'+c+'</th>').join('')+'</tr>';\
for(const l of lines.slice(1).reverse()){h+='<tr>'+l.split(',').map(c=>'<td>'+c+'</td>').join('')+'</tr>'}\
el.innerHTML=h+'</table>'}).catch(()=>{document.getElementById('history').textContent='Log unavailable.'});\
</script>";

pub fn render_home(reading: &Reading, measured_at: &str) -> String {
    let mut page = String::with_capacity(HEAD.len() + HISTORY_SCRIPT.len() + 1024);
    // Writing into a String cannot fail
    let _ = write_home(&mut page, reading, measured_at);
    page
}

fn write_home(out: &mut impl Write, reading: &Reading, measured_at: &str) -> fmt::Result {
    out.write_str(HEAD)?;

    out.write_str("<div class=\"card\"><h3>Last reading</h3><div class=\"val\">")?;
    channel(out, reading.temperature_c)?;
    out.write_str(" &deg;C &nbsp; ")?;
    channel(out, reading.humidity_pct)?;
    out.write_str(" %RH</div><div class=\"at\">Measured at: ")?;
    if measured_at.is_empty() {
        out.write_str("never")?;
    } else {
        escaped(out, measured_at)?;
    }
    out.write_str("</div></div>")?;

    write!(
        out,
        "<div class=\"card\"><h3>Log history</h3><div id=\"history\" class=\"scroll\">Loading...</div>\
<p><a href=\"{DOWNLOAD_PATH}\" download=\"DATALOG.CSV\">Download CSV</a></p></div>"
    )?;

    write!(
        out,
        "<div class=\"card\"><h3>Set date and time (UTC)</h3><form action=\"{SET_TIME_PATH}\" method=\"GET\">\
<input type=\"number\" name=\"Y\" placeholder=\"Year\" required>\
<input type=\"number\" name=\"M\" placeholder=\"Month\" required>\
<input type=\"number\" name=\"D\" placeholder=\"Day\" required>\
<input type=\"number\" name=\"h\" placeholder=\"Hour\" required>\
<input type=\"number\" name=\"m\" placeholder=\"Minute\" required>\
<input type=\"submit\" value=\"Update time\"></form></div>"
    )?;

    out.write_str(HISTORY_SCRIPT)?;
    out.write_str("</body></html>")
}

fn channel(out: &mut impl Write, value: f32) -> fmt::Result {
    if value.is_nan() {
        out.write_str("--")
    } else {
        write!(out, "{value:.1}")
    }
}

fn escaped(out: &mut impl Write, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '&' => out.write_str("&amp;")?,
            '"' => out.write_str("&quot;")?,
            _ => out.write_char(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shows_last_reading_and_when_it_was_measured() {
        let page = render_home(&Reading::new(21.54, 48.06), "2025-06-01 12:00:00");

        assert!(page.contains("21.5 &deg;C"));
        assert!(page.contains("48.1 %RH"));
        assert!(page.contains("Measured at: 2025-06-01 12:00:00"));
        assert!(page.ends_with("</body></html>"));
    }

    #[test]
    fn unset_reading_renders_placeholders() {
        let page = render_home(&Reading::UNSET, "");

        assert!(page.contains("-- &deg;C"));
        assert!(page.contains("-- %RH"));
        assert!(page.contains("Measured at: never"));
    }

    #[test]
    fn links_download_and_set_time_routes() {
        let page = render_home(&Reading::UNSET, "");

        assert!(page.contains("href=\"/download\""));
        assert!(page.contains("fetch('/download')"));
        assert!(page.contains("action=\"/set_time\""));
        for field in ["\"Y\"", "\"M\"", "\"D\"", "\"h\"", "\"m\""] {
            assert!(page.contains(field));
        }
    }

    #[test]
    fn timestamp_text_is_escaped() {
        let page = render_home(&Reading::UNSET, "<b>");
        assert!(page.contains("Measured at: &lt;b&gt;"));
    }
}
