//! Date and time functions, read from the host clock.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use opo_common::Value;

use crate::error::RuntimeError;
use crate::execute::Context;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const DAY_NAMES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Pushes one component of the current local time as a Word.
fn push_now(ctx: &mut Context<'_>, part: fn(&NaiveDateTime) -> u32) {
    let now = ctx.env.host.now();
    // Every component is at most a four-digit year.
    ctx.stack.push(Value::Word(part(&now) as i16));
}

pub(crate) fn year(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.year().max(0) as u32);
    Ok(())
}

pub(crate) fn month(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.month());
    Ok(())
}

pub(crate) fn day(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.day());
    Ok(())
}

pub(crate) fn hour(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.hour());
    Ok(())
}

pub(crate) fn minute(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.minute());
    Ok(())
}

pub(crate) fn second(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    push_now(ctx, |t| t.second());
    Ok(())
}

/// `DATIM$`, e.g. `Fri 16 Oct 2026 09:05:00`.
pub(crate) fn datim(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let now = ctx.env.host.now();
    ctx.stack
        .push(Value::Str(now.format("%a %d %b %Y %H:%M:%S").to_string()));
    Ok(())
}

fn in_range(value: i32, range: std::ops::RangeInclusive<i32>) -> Result<u32, RuntimeError> {
    if range.contains(&value) {
        Ok(value as u32)
    } else {
        Err(RuntimeError::OutOfRange {
            value: i64::from(value),
        })
    }
}

/// `MONTH$(m%)`: three-letter month name for 1 to 12.
pub(crate) fn month_name(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let m = in_range(ctx.stack.pop_int()?, 1..=12)?;
    ctx.stack.push(Value::Str(MONTHS[m as usize - 1].to_string()));
    Ok(())
}

/// `DAYNAME$(d%)`: day name for 1 (Monday) to 7 (Sunday).
pub(crate) fn day_name(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let d = in_range(ctx.stack.pop_int()?, 1..=7)?;
    ctx.stack.push(Value::Str(DAY_NAMES[d as usize - 1].to_string()));
    Ok(())
}

fn date(year: i32, month: i32, day: i32) -> Result<NaiveDate, RuntimeError> {
    in_range(year, 1900..=2100)?;
    let m = in_range(month, 1..=12)?;
    let d = in_range(day, 1..=31)?;
    NaiveDate::from_ymd_opt(year, m, d).ok_or(RuntimeError::OutOfRange {
        value: i64::from(day),
    })
}

/// `DAYS(day%, month%, year%)`: days since 1 January 1900, as a Long.
pub(crate) fn days(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let year = ctx.stack.pop_int()?;
    let month = ctx.stack.pop_int()?;
    let day = ctx.stack.pop_int()?;
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).ok_or(RuntimeError::InvalidArgument)?;
    let elapsed = date(year, month, day)?.signed_duration_since(epoch).num_days();
    // At most two centuries of days.
    ctx.stack.push(Value::Long(elapsed as i32));
    Ok(())
}

/// `DATETOSECS(year%, month%, day%, hour%, minute%, second%)`: seconds
/// since 1970 of a local time, as a Long.
pub(crate) fn date_to_secs(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let second = ctx.stack.pop_int()?;
    let minute = ctx.stack.pop_int()?;
    let hour = ctx.stack.pop_int()?;
    let day = ctx.stack.pop_int()?;
    let month = ctx.stack.pop_int()?;
    let year = ctx.stack.pop_int()?;
    let local = date(year, month, day)?
        .and_hms_opt(
            in_range(hour, 0..=23)?,
            in_range(minute, 0..=59)?,
            in_range(second, 0..=59)?,
        )
        .ok_or(RuntimeError::InvalidArgument)?;
    let secs = ctx
        .env
        .host
        .timestamp(local)
        .ok_or(RuntimeError::InvalidArgument)?;
    let secs = i32::try_from(secs).map_err(|_| RuntimeError::Overflow)?;
    ctx.stack.push(Value::Long(secs));
    Ok(())
}

/// `SECSTODATE s&, var yr%, var mo%, var dy%, var hr%, var mn%, var sc%,
/// var yrday%`: splits seconds since 1970 into local time components.
pub(crate) fn secs_to_date(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let mut targets = [0usize; 7];
    for target in targets.iter_mut().rev() {
        *target = ctx.stack.pop_address()?;
    }
    let secs = ctx.stack.pop_int()?;
    let local = ctx
        .env
        .host
        .local_time(i64::from(secs))
        .ok_or(RuntimeError::InvalidArgument)?;
    let parts = [
        local.year().max(0) as u32,
        local.month(),
        local.day(),
        local.hour(),
        local.minute(),
        local.second(),
        local.ordinal(),
    ];
    for (address, part) in targets.into_iter().zip(parts) {
        ctx.heap.write(&Value::Word(part as i16), address)?;
    }
    Ok(())
}
