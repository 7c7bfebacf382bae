use std::{io::Read, ptr};

#[cfg(unix)]
use minalloc::ProgramBreak;
use minalloc::{Arena, Heap, StaticArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how the arena top moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_top<A: Arena>(
  label: &str,
  heap: &mut Heap<A>,
) {
  println!("[{}] PID = {}, arena top = {:?}", label, std::process::id(), heap.top());
}

fn print_alloc<A: Arena>(
  size: usize,
  address: *mut u8,
  heap: &mut Heap<A>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, arena top = {:?}",
    size,
    address,
    heap.top()
  );
}

fn walkthrough<A: Arena>(mut heap: Heap<A>) {
  print_top("start", &mut heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32. The size is rounded up to a word.
  // --------------------------------------------------------------------
  let first_block = heap.allocate(4);
  println!("\n[1] Allocate u32");
  print_alloc(4, first_block, &mut heap);

  let first_ptr = first_block as *mut u32;
  unsafe { first_ptr.write(0xDEADBEEF) };
  println!("[1] Value written to first_block = 0x{:X}", unsafe { first_ptr.read() });

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes and fill them with a pattern.
  // --------------------------------------------------------------------
  let second_block = heap.allocate(12);
  println!("\n[2] Allocate [u8; 12]");
  print_alloc(12, second_block, &mut heap);

  unsafe { ptr::write_bytes(second_block, 0xAB, 12) };
  println!("[2] Initialized second block with 0xAB");

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Zeroed array of 16 u16 through calloc.
  // --------------------------------------------------------------------
  let third_block = heap.calloc(16, 2);
  println!("\n[3] Calloc [u16; 16]");
  print_alloc(32, third_block, &mut heap);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release the first block. It is not at the top, so it only becomes
  //    free and the arena top stays where it is.
  // --------------------------------------------------------------------
  unsafe { heap.release(first_block) };
  println!("\n[4] Released first_block at {:?}", first_block);
  print_top("after release", &mut heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Allocate 2 bytes: first fit hands back the freed block.
  // --------------------------------------------------------------------
  let fourth_block = heap.allocate(2);
  println!("\n[5] Allocate [u8; 2] (check reuse of freed block)");
  print_alloc(2, fourth_block, &mut heap);

  println!(
    "[5] fourth_block == first_block? {}",
    if fourth_block == first_block {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Grow the 12-byte block. It moves to the top and keeps its bytes.
  // --------------------------------------------------------------------
  let grown = unsafe { heap.realloc(second_block, 64 * 1024) };
  println!("\n[6] Realloc second_block to 64 KiB");
  print_alloc(64 * 1024, grown, &mut heap);
  println!("[6] First byte after move = 0x{:X}", unsafe { grown.read() });

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 7) Release the block at the top: its bytes go back to the arena.
  // --------------------------------------------------------------------
  print_top("before release of top block", &mut heap);
  unsafe { heap.release(grown) };
  print_top("after release of top block", &mut heap);

  let stats = heap.stats();
  println!(
    "\n[7] {} blocks ({} free), {} bytes in use, {} bytes free",
    stats.blocks, stats.free_blocks, stats.used_bytes, stats.free_bytes
  );
}

fn main() {
  env_logger::init();

  #[cfg(unix)]
  if std::env::args().any(|arg| arg == "--sbrk") {
    // Demo only: a brk-based platform allocator may move the break too.
    match unsafe { ProgramBreak::new() } {
      Ok(arena) => walkthrough(Heap::new(arena)),
      Err(err) => eprintln!("cannot take over the program break: {err}"),
    }
    return;
  }

  match StaticArena::with_capacity(1024 * 1024) {
    Ok(arena) => walkthrough(Heap::new(arena)),
    Err(err) => eprintln!("cannot reserve arena: {err}"),
  }
}
