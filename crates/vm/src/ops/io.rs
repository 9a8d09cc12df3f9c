//! Opcodes that talk to the host: text and graphics output, dialogs,
//! menus, keyboard input, timed waits and I/O handles.

use std::time::{Duration, Instant};

use opo_common::{Value, ValueType};

use crate::error::{io_code, RuntimeError};
use crate::execute::{Await, AwaitKind, Context, DialogState};
use crate::host::DialogItem;

/// PAUSE counts in twentieths of a second.
const PAUSE_TICK: Duration = Duration::from_millis(50);

/// Status word of an I/O request that has not finished.
const PENDING: i16 = -46;

/// `IOA` function that starts a relative timer.
const TIMER_RELATIVE: i16 = 1;

fn pop_point(ctx: &mut Context<'_>) -> Result<(i16, i16), RuntimeError> {
    let y = ctx.stack.pop_word()?;
    let x = ctx.stack.pop_word()?;
    Ok((x, y))
}

fn pop_text(ctx: &mut Context<'_>) -> Result<String, RuntimeError> {
    Ok(ctx.stack.pop()?.to_string())
}

fn await_input(ctx: &mut Context<'_>, kind: AwaitKind) {
    ctx.env.awaiting = Some(Await::Input(kind));
}

// ---- Text window ----

/// `0x88`-`0x8B`: `PRINT x;`.
pub(crate) fn print(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let text = pop_text(ctx)?;
    ctx.env.host.print(&text);
    Ok(())
}

pub(crate) fn print_newline(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.host.print_newline();
    Ok(())
}

pub(crate) fn at(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (x, y) = pop_point(ctx)?;
    ctx.env.host.at(x, y);
    Ok(())
}

pub(crate) fn cls(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.host.cls();
    Ok(())
}

/// `BEEP time%, pitch%`.
pub(crate) fn beep(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let pitch = ctx.stack.pop_word()?;
    let duration = ctx.stack.pop_word()?;
    ctx.env.host.beep(duration, pitch);
    Ok(())
}

/// `FONT font%, style%`.
pub(crate) fn font(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let style = ctx.stack.pop_int()?;
    let font = ctx.stack.pop_int()?;
    ctx.env.host.font(font, style);
    Ok(())
}

pub(crate) fn style(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let style = ctx.stack.pop_int()?;
    ctx.env.host.style(style);
    Ok(())
}

/// `gIPRINT text$[, corner%]`. The inline byte is the number of optional
/// arguments given.
pub(crate) fn info_print(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let optional = ctx.activation.read_u8()?;
    let corner = if optional == 1 { ctx.stack.pop_word()? } else { 3 };
    let text = ctx.stack.pop_string()?;
    ctx.env.host.info_print(&text, corner);
    Ok(())
}

/// `CACHE`: no cache is kept; operands are consumed.
pub(crate) fn cache(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let form = ctx.activation.read_u8()?;
    if form == 2 {
        ctx.stack.pop_n(2)?;
    }
    Ok(())
}

// ---- Graphics ----

pub(crate) fn graphics_cls(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.host.graphics_cls();
    Ok(())
}

pub(crate) fn graphics_at(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (x, y) = pop_point(ctx)?;
    ctx.env.host.graphics_at(x, y);
    Ok(())
}

pub(crate) fn graphics_move(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (dx, dy) = pop_point(ctx)?;
    ctx.env.host.graphics_move(dx, dy);
    Ok(())
}

/// `0xD4`-`0xD7`: `gPRINT x;`. NUL characters are dropped.
pub(crate) fn graphics_print(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let text = pop_text(ctx)?.replace('\0', "");
    ctx.env.host.graphics_print(&text);
    Ok(())
}

pub(crate) fn graphics_x(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (x, _) = ctx.env.host.graphics_position();
    ctx.stack.push(Value::Word(x));
    Ok(())
}

pub(crate) fn graphics_y(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (_, y) = ctx.env.host.graphics_position();
    ctx.stack.push(Value::Word(y));
    Ok(())
}

// ---- Dialogs and menus ----

/// `dINIT [title$[, flags%]]`.
pub(crate) fn dialog_init(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let given = ctx.activation.read_u8()?;
    let flags = if given == 2 { ctx.stack.pop_word()? } else { 0 };
    let title = if given > 0 {
        ctx.stack.pop_string()?
    } else {
        String::new()
    };
    ctx.env.dialog = DialogState::default();
    ctx.env.host.dialog_init(&title, flags);
    Ok(())
}

/// `dTEXT prompt$, body$[, align%]`.
pub(crate) fn dialog_text(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let given = ctx.activation.read_u8()?;
    let align = if given == 1 { ctx.stack.pop_word()? } else { 0 };
    let body = ctx.stack.pop_string()?;
    let prompt = ctx.stack.pop_string()?;
    ctx.env.dialog.lines += 1;
    ctx.env.host.dialog_text(&prompt, &body, align);
    Ok(())
}

/// Adds an editable line whose result goes to the variable at `address`.
fn add_field(ctx: &mut Context<'_>, address: usize, ty: ValueType, item: DialogItem) {
    let dialog = &mut ctx.env.dialog;
    dialog.lines += 1;
    dialog.fields.push((dialog.lines, address, ty));
    let line = dialog.lines;
    ctx.env.host.dialog_item(line, &item);
}

/// `dCHOICE var choice%, prompt$, list$`. The list is comma separated.
pub(crate) fn dialog_choice(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let list = ctx.stack.pop_string()?;
    let prompt = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let initial = ctx
        .heap
        .read(ValueType::Word, address)?
        .as_i32()
        .unwrap_or(1)
        .max(1) as i16;
    let choices = list.split(',').map(str::to_string).collect();
    let item = DialogItem::Choice {
        prompt,
        choices,
        initial,
    };
    add_field(ctx, address, ValueType::Word, item);
    Ok(())
}

/// `dLONG var l&, prompt$, min&, max&`.
pub(crate) fn dialog_long(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let max = ctx.stack.pop_int()?;
    let min = ctx.stack.pop_int()?;
    let prompt = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let initial = ctx.heap.read(ValueType::Long, address)?.as_i32().unwrap_or(0);
    let item = DialogItem::Long {
        prompt,
        initial,
        min,
        max,
    };
    add_field(ctx, address, ValueType::Long, item);
    Ok(())
}

/// `dFLOAT var f, prompt$, min, max`.
pub(crate) fn dialog_float(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let max = ctx.stack.pop_float()?;
    let min = ctx.stack.pop_float()?;
    let prompt = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let initial = ctx.heap.read(ValueType::Float, address)?.as_f64().unwrap_or(0.0);
    let item = DialogItem::Float {
        prompt,
        initial,
        min,
        max,
    };
    add_field(ctx, address, ValueType::Float, item);
    Ok(())
}

fn edit(ctx: &mut Context<'_>, max_len: i16) -> Result<(), RuntimeError> {
    let prompt = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let initial = ctx.heap.read(ValueType::Str, address)?.to_string();
    let item = DialogItem::Edit {
        prompt,
        initial,
        max_len,
    };
    add_field(ctx, address, ValueType::Str, item);
    Ok(())
}

/// `dEDIT var s$, prompt$`: up to 255 characters.
pub(crate) fn dialog_edit(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    edit(ctx, 255)
}

/// `dEDIT var s$, prompt$, len%`.
pub(crate) fn dialog_edit_limited(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let max_len = ctx.stack.pop_word()?;
    edit(ctx, max_len)
}

/// `dFILE var f$, prompt$, flags%`.
pub(crate) fn dialog_file(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let flags = ctx.stack.pop_word()?;
    let prompt = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let initial = ctx.heap.read(ValueType::Str, address)?.to_string();
    let item = DialogItem::File {
        prompt,
        initial,
        flags,
    };
    add_field(ctx, address, ValueType::Str, item);
    Ok(())
}

/// Pops `count` `(text$, key%)` pairs and returns them in push order.
fn pop_pairs(ctx: &mut Context<'_>, count: u8) -> Result<Vec<(String, i16)>, RuntimeError> {
    let mut pairs = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let key = ctx.stack.pop_word()?;
        let text = ctx.stack.pop_string()?;
        pairs.push((text, key));
    }
    pairs.reverse();
    Ok(pairs)
}

/// `dBUTTONS text1$, key1%, ...`. The inline byte is the pair count.
pub(crate) fn dialog_buttons(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let count = ctx.activation.read_u8()?;
    let buttons = pop_pairs(ctx, count)?;
    ctx.env.host.dialog_buttons(&buttons);
    Ok(())
}

/// `dPOSITION x%, y%`.
pub(crate) fn dialog_position(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let (x, y) = pop_point(ctx)?;
    ctx.env.host.dialog_position(x, y);
    Ok(())
}

/// `DIALOG`: show the dialog and wait for its result.
pub(crate) fn dialog(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.host.dialog_show();
    await_input(ctx, AwaitKind::Dialog);
    Ok(())
}

/// `ALERT(m1$[, m2$[, b1$[, b2$[, b3$]]]])`: a message dialog whose result
/// is the number of the button chosen. With no buttons given there is a
/// single `Continue` button.
pub(crate) fn alert(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let given = ctx.activation.read_u8()?;
    let mut texts = Vec::with_capacity(usize::from(given));
    for _ in 0..given {
        texts.push(ctx.stack.pop_string()?);
    }
    texts.reverse();
    let mut texts = texts.into_iter();
    let title = texts.next().unwrap_or_default();
    let message = texts.next();
    let mut buttons: Vec<(String, i16)> = texts.zip(1..).collect();
    if buttons.is_empty() {
        buttons.push((String::from("Continue"), 1));
    }

    ctx.env.dialog = DialogState::default();
    ctx.env.host.dialog_init(&title, 0);
    if let Some(message) = message {
        ctx.env.dialog.lines += 1;
        ctx.env.host.dialog_text("", &message, 0);
    }
    ctx.env.host.dialog_buttons(&buttons);
    ctx.env.host.dialog_show();
    await_input(ctx, AwaitKind::Dialog);
    Ok(())
}

pub(crate) fn menu_init(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.menu_var = None;
    ctx.env.host.menu_init();
    Ok(())
}

/// `mCARD title$, item1$, key1%, ...`. The inline byte is the item count.
pub(crate) fn menu_card(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let count = ctx.activation.read_u8()?;
    let items = pop_pairs(ctx, count)?;
    let title = ctx.stack.pop_string()?;
    ctx.env.host.menu_card(&title, &items);
    Ok(())
}

/// `MENU`: show the menu and wait for a selection.
pub(crate) fn menu(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.menu_var = None;
    ctx.env.host.menu_show(0);
    await_input(ctx, AwaitKind::Menu);
    Ok(())
}

/// `MENU(var init%)`: starts on the item `init%` names and writes the
/// highlighted item back to it when the menu closes.
pub(crate) fn menu_with_highlight(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    let initial = ctx.heap.read(ValueType::Word, address)?.as_i32().unwrap_or(0) as i16;
    ctx.env.menu_var = Some(address);
    ctx.env.host.menu_show(initial);
    await_input(ctx, AwaitKind::Menu);
    Ok(())
}

// ---- Keyboard and events ----

/// `GET`: wait for a key code.
pub(crate) fn get(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    await_input(ctx, AwaitKind::Key);
    Ok(())
}

/// `GET$`: wait for a key as a string.
pub(crate) fn get_string(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    await_input(ctx, AwaitKind::KeyString);
    Ok(())
}

/// `KEY`: the last key pressed, which is then forgotten.
pub(crate) fn key(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let key = std::mem::take(&mut ctx.env.last_key);
    ctx.stack.push(Value::Word(key));
    ctx.env.host.composite();
    Ok(())
}

pub(crate) fn test_event(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let pending = ctx.env.last_key != 0;
    ctx.stack.push(Value::Word(if pending { -1 } else { 0 }));
    Ok(())
}

/// `GETEVENT ev%()`: writes the last key and an empty modifier word.
pub(crate) fn get_event(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    ctx.heap.write(&Value::Word(ctx.env.last_key), address)?;
    ctx.heap.write(&Value::Word(0), address + 2)
}

/// `PAUSE n%`: zero waits for a key, a positive count waits that many
/// twentieths of a second and a negative count does not wait.
pub(crate) fn pause(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ticks = ctx.stack.pop_int()?;
    match ticks {
        0 => await_input(ctx, AwaitKind::Pause),
        t if t > 0 => {
            let deadline = Instant::now() + PAUSE_TICK * t as u32;
            ctx.env.awaiting = Some(Await::Until(deadline));
        }
        _ => {}
    }
    Ok(())
}

// ---- I/O handles ----

pub(crate) fn io_signal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.host.io_signal();
    Ok(())
}

/// Pushes 0 for success or the failure's error code, as the `IO`
/// functions return.
fn push_status<T>(ctx: &mut Context<'_>, result: std::io::Result<T>) -> Option<T> {
    match result {
        Ok(v) => {
            ctx.stack.push(Value::Word(0));
            Some(v)
        }
        Err(e) => {
            ctx.stack.push(Value::Word(io_code(&e)));
            None
        }
    }
}

/// `IOOPEN(var handle%, name$, mode%)`.
pub(crate) fn io_open(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let mode = ctx.stack.pop_word()?;
    let name = ctx.stack.pop_string()?;
    let address = ctx.stack.pop_address()?;
    let opened = ctx.env.host.io_open(&name, mode);
    if let Some(handle) = push_status(ctx, opened) {
        ctx.heap.write(&Value::Word(handle), address)?;
    }
    Ok(())
}

/// `IOCLOSE(handle%)`.
pub(crate) fn io_close(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let handle = ctx.stack.pop_word()?;
    let closed = ctx.env.host.io_close(handle);
    push_status(ctx, closed);
    Ok(())
}

/// `IOREAD(handle%, address%, max%)`: returns the byte count read, or an
/// error code.
pub(crate) fn io_read(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let max = ctx.stack.pop_word()?;
    let address = ctx.stack.pop_address()?;
    let handle = ctx.stack.pop_word()?;
    let max = usize::try_from(max).map_err(|_| RuntimeError::InvalidArgument)?;
    match ctx.env.host.io_read(handle, max) {
        Ok(mut data) => {
            data.truncate(max);
            ctx.heap.write_bytes(address, &data)?;
            // At most `max` bytes, and `max` came from an i16.
            ctx.stack.push(Value::Word(data.len() as i16));
        }
        Err(e) => ctx.stack.push(Value::Word(io_code(&e))),
    }
    Ok(())
}

/// `IOWRITE(handle%, address%, len%)`.
pub(crate) fn io_write(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let len = ctx.stack.pop_word()?;
    let address = ctx.stack.pop_address()?;
    let handle = ctx.stack.pop_word()?;
    let len = usize::try_from(len).map_err(|_| RuntimeError::InvalidArgument)?;
    let data = ctx.heap.bytes(address, len)?.to_vec();
    let written = ctx.env.host.io_write(handle, &data);
    push_status(ctx, written);
    Ok(())
}

/// `IOSEEK(handle%, mode%, var offset&)`: the new position is written back
/// to `offset&`.
pub(crate) fn io_seek(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    let mode = ctx.stack.pop_word()?;
    let handle = ctx.stack.pop_word()?;
    let offset = ctx.heap.read(ValueType::Long, address)?.as_i32().unwrap_or(0);
    let sought = ctx.env.host.io_seek(handle, mode, offset);
    if let Some(position) = push_status(ctx, sought) {
        ctx.heap.write(&Value::Long(position), address)?;
    }
    Ok(())
}

/// `IOA(handle%, function%, var status%, var arg1, var arg2)`. Only the
/// relative timer function is serviced; its interval is the Long at
/// `arg1`. The status word reads as pending until the host reports the
/// request finished.
pub(crate) fn io_async(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let _arg2 = ctx.stack.pop_address()?;
    let arg1 = ctx.stack.pop_address()?;
    let status = ctx.stack.pop_address()?;
    let function = ctx.stack.pop_word()?;
    let handle = ctx.stack.pop_word()?;
    if function != TIMER_RELATIVE {
        ctx.stack.push(Value::Word(-4));
        return Ok(());
    }
    let interval = ctx.heap.read(ValueType::Long, arg1)?.as_i32().unwrap_or(0);
    let status_word = u16::try_from(status).map_err(|_| RuntimeError::AddressOutOfRange {
        address: status,
        size: ctx.heap.size(),
    })?;
    let started = ctx.env.host.add_timer(handle, status_word, interval);
    if push_status(ctx, started).is_some() {
        ctx.heap.write(&Value::Word(PENDING), status)?;
    }
    Ok(())
}

/// `IOWAITSTAT var status%`: waits while the status word is pending.
pub(crate) fn io_wait_status(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let operand = ctx.stack.pop()?;
    let address = operand
        .as_address()
        .map(usize::from)
        .ok_or(RuntimeError::TypeMismatch {
            expected: ValueType::Addr,
            found: operand.value_type(),
        })?;
    if ctx.heap.read(ValueType::Word, address)? == Value::Word(PENDING) {
        // Run this instruction again after the wait.
        ctx.stack.push(operand);
        ctx.activation.pc -= 1;
        ctx.env.awaiting = Some(Await::Until(Instant::now() + PAUSE_TICK));
    }
    Ok(())
}
