// Copyright 2025 Crucible Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{
	Arc, Condvar, Mutex, MutexGuard,
	atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::orderbook::OrderBook;
use crate::types::{Depth, Order, OrderId, OrderUpdate, Price, Trade};

/// Thread-safe matching engine for a single instrument
///
/// The engine wraps the book core in a single mutex; every public
/// operation acquires it for its full duration, so operations appear in a
/// total order consistent with lock acquisition. The one exception is
/// `modify_order`, which releases between reading the preserved type and
/// the cancel + re-add (see the method docs).
///
/// A background thread owned by the engine sweeps good-for-day orders at
/// the configured session close. It shares the book mutex and waits on a
/// condition variable so shutdown can interrupt the overnight sleep.
/// Dropping the engine signals the thread and joins it.
pub struct MatchingEngine {
	shared: Arc<Shared>,
	pruner: Option<JoinHandle<()>>,
}

/// State behind the engine's stable shared allocation: the book mutex,
/// the shutdown condition variable paired with it, and the shutdown flag.
struct Shared {
	config: EngineConfig,
	book: Mutex<OrderBook>,
	shutdown_cv: Condvar,
	shutdown: AtomicBool,
}

impl MatchingEngine {
	/// Start the engine and its pruner thread.
	pub fn new(config: EngineConfig) -> Self {
		let shared = Arc::new(Shared {
			book: Mutex::new(OrderBook::new()),
			shutdown_cv: Condvar::new(),
			shutdown: AtomicBool::new(false),
			config,
		});

		let pruner_shared = shared.clone();
		let pruner = thread::Builder::new()
			.name("book-pruner".to_string())
			.spawn(move || run_pruner(pruner_shared))
			.expect("failed to spawn pruner thread");

		info!(market = %shared.config.market, "matching engine started");

		Self {
			shared,
			pruner: Some(pruner),
		}
	}

	/// Admit an order and return the trades it produced.
	///
	/// Rejections are silent (an empty vec, book unchanged): duplicate id,
	/// market order against an empty opposite side, non-marketable
	/// fill-and-kill, or fill-or-kill without full depth.
	pub fn add_order(&self, order: Order) -> Vec<Trade> {
		let id = order.id();
		let trades = self.lock_book().add_order(order);
		if self.shared.config.verbose_logging {
			debug!(order_id = id, trades = trades.len(), "order processed");
		}
		trades
	}

	/// Cancel a resting order. Unknown ids are a no-op.
	pub fn cancel_order(&self, id: OrderId) {
		self.lock_book().cancel_order(id);
		if self.shared.config.verbose_logging {
			debug!(order_id = id, "order cancelled");
		}
	}

	/// Cancel a batch of orders through a single lock acquisition.
	pub fn cancel_batch(&self, ids: &[OrderId]) {
		let mut book = self.lock_book();
		for &id in ids {
			book.cancel_order(id);
		}
	}

	/// Replace a resting order's side, price, and quantity, preserving its
	/// type and resetting its time priority. Unknown ids produce no trades.
	///
	/// The preserved type is read under the lock, which is then released:
	/// the cancel and the re-add below each take the lock themselves. A
	/// concurrent cancel or fill inside that window degenerates the update
	/// into a plain insertion of the replacement order.
	pub fn modify_order(&self, update: OrderUpdate) -> Vec<Trade> {
		let order_type = match self.lock_book().order_type(update.id) {
			Some(order_type) => order_type,
			None => return Vec::new(),
		};

		let order = match update.into_order(order_type) {
			Ok(order) => order,
			Err(err) => {
				warn!(order_id = update.id, %err, "rejecting replacement order");
				return Vec::new();
			}
		};

		self.cancel_order(update.id);
		self.add_order(order)
	}

	/// Number of resting orders across both sides.
	pub fn size(&self) -> usize {
		self.lock_book().size()
	}

	/// Copy of a resting order, if present.
	pub fn order(&self, id: OrderId) -> Option<Order> {
		self.lock_book().order(id).cloned()
	}

	/// Aggregated per-level snapshot of both sides.
	pub fn depth(&self) -> Depth {
		self.lock_book().depth()
	}

	pub fn best_bid(&self) -> Option<Price> {
		self.lock_book().best_bid()
	}

	pub fn best_ask(&self) -> Option<Price> {
		self.lock_book().best_ask()
	}

	fn lock_book(&self) -> MutexGuard<'_, OrderBook> {
		self.shared.book.lock().unwrap()
	}
}

impl Default for MatchingEngine {
	fn default() -> Self {
		Self::new(EngineConfig::default())
	}
}

impl Drop for MatchingEngine {
	fn drop(&mut self) {
		self.shared.shutdown.store(true, Ordering::Release);
		// Take the book lock before notifying so the pruner cannot miss
		// the signal between its shutdown check and its wait.
		drop(self.shared.book.lock().unwrap());
		self.shared.shutdown_cv.notify_all();

		if let Some(handle) = self.pruner.take() {
			if handle.join().is_err() {
				warn!("pruner thread panicked");
			}
		}
		info!(market = %self.shared.config.market, "matching engine stopped");
	}
}

/// Session-close sweep loop.
///
/// Waits on the shutdown condition variable until the next session close
/// (plus the configured slack), then cancels every resting good-for-day
/// order: ids are collected under the lock the wait returned with, and the
/// sweep itself goes through one fresh acquisition of the same mutex.
fn run_pruner(shared: Arc<Shared>) {
	let slack = Duration::from_millis(shared.config.prune_slack_ms);

	let mut book = shared.book.lock().unwrap();
	loop {
		if shared.shutdown.load(Ordering::Acquire) {
			return;
		}

		let wait = time_until_session_close(Local::now().naive_local(), shared.config.session_close)
			.to_std()
			.unwrap_or_default()
			+ slack;

		let (guard, timeout) = shared.shutdown_cv.wait_timeout(book, wait).unwrap();
		book = guard;

		if shared.shutdown.load(Ordering::Acquire) {
			return;
		}
		if !timeout.timed_out() {
			// Spurious wake; recompute the deadline.
			continue;
		}

		let expired = book.good_for_day_ids();
		drop(book);

		if !expired.is_empty() {
			info!(
				count = expired.len(),
				"session close: pruning good-for-day orders"
			);
			let mut locked = shared.book.lock().unwrap();
			for &id in &expired {
				locked.cancel_order(id);
			}
		}

		book = shared.book.lock().unwrap();
	}
}

/// Time remaining until the next occurrence of the session close: today's
/// if it is still ahead, otherwise tomorrow's.
fn time_until_session_close(now: NaiveDateTime, close: NaiveTime) -> chrono::Duration {
	let date = if now.time() < close {
		now.date()
	} else {
		now.date() + Days::new(1)
	};
	date.and_time(close) - now
}
