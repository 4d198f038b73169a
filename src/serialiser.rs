use crate::srt::Subtitle;

use std::io::Write;
use std::time::Duration;

use anyhow::Result;

pub fn write_subs<W: Write>(buf: &mut W, subs: &[Subtitle]) -> Result<()> {
    for sub in subs {
        write_sub(buf, sub)?;
    }
    Ok(())
}

fn write_sub<W: Write>(buf: &mut W, sub: &Subtitle) -> Result<()> {
    writeln!(buf, "{}", sub.sequence_number)?;
    write_ts(buf, sub.show_at)?;
    write!(buf, " --> ")?;
    write_ts(buf, sub.hide_at)?;
    writeln!(buf)?;
    writeln!(buf, "{}", sub.text)?;
    writeln!(buf)?;
    Ok(())
}

/// SRT timing: `HH:MM:SS,mmm`, hours widening past 99.
fn write_ts<W: Write>(buf: &mut W, at: Duration) -> Result<()> {
    const MS_PER_HOUR: u128 = 3_600_000;
    const MS_PER_MINUTE: u128 = 60_000;
    let ms = at.as_millis();
    write!(
        buf,
        "{:02}:{:02}:{:02},{:03}",
        ms / MS_PER_HOUR,
        ms % MS_PER_HOUR / MS_PER_MINUTE,
        ms % MS_PER_MINUTE / 1000,
        ms % 1000
    )?;
    Ok(())
}
