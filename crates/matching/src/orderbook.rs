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

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use slab::Slab;

use crate::types::{
	Depth, LevelInfo, Order, OrderId, OrderType, Price, Quantity, Side, Trade, TradeLeg,
};

/// Node in the order arena, intrusively linked into its price level's FIFO
/// queue. The arena index is the stable locator the order index stores:
/// it survives insertion and removal of every other node in the level.
#[derive(Debug)]
struct OrderNode {
	order: Order,
	prev: Option<usize>,
	next: Option<usize>,
}

/// Mutation applied to a level's running aggregates.
#[derive(Debug, Clone, Copy)]
enum LevelEvent {
	/// A new order rests at the level.
	Add,
	/// A resting order leaves the level (cancelled or fully filled).
	Remove,
	/// A resting order was partially consumed by a trade.
	Match,
}

/// Price level in the order book
///
/// Orders at the level form a FIFO queue in time priority: admission links
/// at the tail, matching consumes from the head. The queue is a doubly
/// linked list threaded through the order arena so that any order can be
/// unlinked in O(1) without disturbing its neighbors. The level also keeps
/// running totals of resting quantity and order count; every ladder
/// mutation reports the corresponding `LevelEvent` here.
#[derive(Debug, Default)]
struct PriceLevel {
	head: Option<usize>,
	tail: Option<usize>,
	quantity: Quantity,
	count: u32,
}

impl PriceLevel {
	fn push_back(&mut self, arena: &mut Slab<OrderNode>, idx: usize) {
		match self.tail {
			Some(tail) => {
				arena[tail].next = Some(idx);
				arena[idx].prev = Some(tail);
			}
			None => {
				self.head = Some(idx);
				arena[idx].prev = None;
			}
		}
		arena[idx].next = None;
		self.tail = Some(idx);
	}

	fn unlink(&mut self, arena: &mut Slab<OrderNode>, idx: usize) {
		let prev = arena[idx].prev;
		let next = arena[idx].next;

		match prev {
			Some(p) => arena[p].next = next,
			None => self.head = next,
		}
		match next {
			Some(n) => arena[n].prev = prev,
			None => self.tail = prev,
		}
		arena[idx].prev = None;
		arena[idx].next = None;
	}

	fn update(&mut self, event: LevelEvent, quantity: Quantity) {
		match event {
			LevelEvent::Add => {
				self.count += 1;
				self.quantity += quantity;
			}
			LevelEvent::Remove => {
				self.count -= 1;
				self.quantity -= quantity;
			}
			LevelEvent::Match => {
				self.quantity -= quantity;
			}
		}
	}
}

/// Limit order book for a single instrument (single-threaded core)
///
/// Two price-indexed ladders hold the resting orders: bids iterate highest
/// price first (via the `Reverse` key), asks lowest first. A price key is
/// present iff its FIFO is non-empty; empty levels are evicted eagerly.
/// The order index maps every resting id to its arena slot for O(1)
/// cancellation.
///
/// All methods assume external synchronization: `MatchingEngine` wraps
/// the book in its mutex and the internal helpers never lock.
#[derive(Debug, Default)]
pub struct OrderBook {
	/// Buy side: price (high to low) -> level
	bids: BTreeMap<Reverse<Price>, PriceLevel>,
	/// Sell side: price (low to high) -> level
	asks: BTreeMap<Price, PriceLevel>,
	/// Storage for every resting order
	arena: Slab<OrderNode>,
	/// OrderId -> arena slot of the resting order
	index: HashMap<OrderId, usize>,
}

impl OrderBook {
	pub fn new() -> Self {
		Self::default()
	}

	/// Admit an order and run the crossing loop.
	///
	/// Returns the trades produced, in price priority then FIFO order.
	/// Rejections are silent: a duplicate id, a market order with no
	/// opposite liquidity, a non-marketable fill-and-kill, or a
	/// fill-or-kill that cannot be fully filled all return an empty vec
	/// and leave the book unchanged.
	pub fn add_order(&mut self, mut order: Order) -> Vec<Trade> {
		if self.index.contains_key(&order.id()) {
			return Vec::new();
		}

		if order.order_type() == OrderType::Market {
			// Rest at the worst opposite price after sweeping; a market
			// order cannot rest against an empty side.
			let worst = match order.side() {
				Side::Buy => self.worst_ask(),
				Side::Sell => self.worst_bid(),
			};
			match worst {
				Some(price) => order.to_good_till_cancel(price),
				None => return Vec::new(),
			}
		}

		if order.order_type() == OrderType::FillAndKill
			&& !self.can_match(order.side(), order.price())
		{
			return Vec::new();
		}

		if order.order_type() == OrderType::FillOrKill
			&& !self.can_fully_fill(order.side(), order.price(), order.initial_quantity())
		{
			return Vec::new();
		}

		self.insert(order);
		self.match_orders()
	}

	/// Cancel a resting order. Unknown ids are a no-op.
	pub fn cancel_order(&mut self, id: OrderId) {
		let idx = match self.index.remove(&id) {
			Some(idx) => idx,
			None => return,
		};
		self.remove_resting(idx);
	}

	/// Number of resting orders across both sides.
	pub fn size(&self) -> usize {
		self.index.len()
	}

	pub fn best_bid(&self) -> Option<Price> {
		self.bids.keys().next().map(|&Reverse(price)| price)
	}

	pub fn best_ask(&self) -> Option<Price> {
		self.asks.keys().next().copied()
	}

	fn worst_bid(&self) -> Option<Price> {
		self.bids.keys().next_back().map(|&Reverse(price)| price)
	}

	fn worst_ask(&self) -> Option<Price> {
		self.asks.keys().next_back().copied()
	}

	/// Look up a resting order by id.
	pub fn order(&self, id: OrderId) -> Option<&Order> {
		self.index.get(&id).map(|&idx| &self.arena[idx].order)
	}

	/// Behavioral type of a resting order, if present.
	pub fn order_type(&self, id: OrderId) -> Option<OrderType> {
		self.order(id).map(|order| order.order_type())
	}

	/// Aggregated per-level view of both sides. Bids descend, asks ascend;
	/// each level reports the sum of remaining quantities resting there.
	pub fn depth(&self) -> Depth {
		Depth {
			bids: self
				.bids
				.iter()
				.map(|(&Reverse(price), level)| LevelInfo {
					price,
					quantity: level.quantity,
				})
				.collect(),
			asks: self
				.asks
				.iter()
				.map(|(&price, level)| LevelInfo {
					price,
					quantity: level.quantity,
				})
				.collect(),
		}
	}

	/// Ids of every resting good-for-day order, for the session-close
	/// sweep.
	pub fn good_for_day_ids(&self) -> Vec<OrderId> {
		self.arena
			.iter()
			.filter(|(_, node)| node.order.order_type() == OrderType::GoodForDay)
			.map(|(_, node)| node.order.id())
			.collect()
	}

	/// True iff the opposite side is non-empty and a limit at `price`
	/// would trade immediately.
	fn can_match(&self, side: Side, price: Price) -> bool {
		match side {
			Side::Buy => match self.best_ask() {
				Some(best_ask) => price >= best_ask,
				None => false,
			},
			Side::Sell => match self.best_bid() {
				Some(best_bid) => price <= best_bid,
				None => false,
			},
		}
	}

	/// True iff the opposite side holds at least `quantity` units at
	/// prices satisfying the candidate's limit. Walks the level aggregates
	/// from the top in matching order and stops at the first level the
	/// limit excludes.
	fn can_fully_fill(&self, side: Side, price: Price, quantity: Quantity) -> bool {
		let mut needed = quantity;

		match side {
			Side::Buy => {
				for (&level_price, level) in &self.asks {
					if level_price > price {
						break;
					}
					if level.quantity >= needed {
						return true;
					}
					needed -= level.quantity;
				}
			}
			Side::Sell => {
				for (&Reverse(level_price), level) in &self.bids {
					if level_price < price {
						break;
					}
					if level.quantity >= needed {
						return true;
					}
					needed -= level.quantity;
				}
			}
		}

		false
	}

	/// Link an admitted order at the tail of its price bucket and record
	/// it in the order index.
	fn insert(&mut self, order: Order) {
		let id = order.id();
		let side = order.side();
		let price = order.price();
		let credit = order.initial_quantity();

		let idx = self.arena.insert(OrderNode {
			order,
			prev: None,
			next: None,
		});

		let level = match side {
			Side::Buy => self.bids.entry(Reverse(price)).or_default(),
			Side::Sell => self.asks.entry(price).or_default(),
		};
		level.push_back(&mut self.arena, idx);
		level.update(LevelEvent::Add, credit);

		self.index.insert(id, idx);
	}

	/// Unlink a resting order from its level, debit the aggregates, evict
	/// the level if it emptied, and free the arena slot. The index entry
	/// must already be gone.
	fn remove_resting(&mut self, idx: usize) {
		let (side, price, remaining) = {
			let order = &self.arena[idx].order;
			(order.side(), order.price(), order.remaining_quantity())
		};

		match side {
			Side::Buy => {
				let level = self
					.bids
					.get_mut(&Reverse(price))
					.expect("resting bid has no price level");
				level.unlink(&mut self.arena, idx);
				level.update(LevelEvent::Remove, remaining);
				if level.count == 0 {
					self.bids.remove(&Reverse(price));
				}
			}
			Side::Sell => {
				let level = self
					.asks
					.get_mut(&price)
					.expect("resting ask has no price level");
				level.unlink(&mut self.arena, idx);
				level.update(LevelEvent::Remove, remaining);
				if level.count == 0 {
					self.asks.remove(&price);
				}
			}
		}

		self.arena.remove(idx);
	}

	/// Cross the book until the top prices no longer overlap.
	///
	/// Each iteration pairs the head of the best bid queue with the head
	/// of the best ask queue and trades the smaller remaining quantity at
	/// each order's own price, keeping strict price-time priority. Filled
	/// orders leave the book immediately; emptied levels are evicted so
	/// the next iteration sees the fresh top of book.
	fn match_orders(&mut self) -> Vec<Trade> {
		let mut trades = Vec::new();

		loop {
			let (bid_price, ask_price) = match (self.best_bid(), self.best_ask()) {
				(Some(bid), Some(ask)) => (bid, ask),
				_ => break,
			};
			if bid_price < ask_price {
				break;
			}

			let bid_idx = self.bids[&Reverse(bid_price)]
				.head
				.expect("non-empty bid level has a head");
			let ask_idx = self.asks[&ask_price]
				.head
				.expect("non-empty ask level has a head");

			let quantity = self.arena[bid_idx]
				.order
				.remaining_quantity()
				.min(self.arena[ask_idx].order.remaining_quantity());

			self.arena[bid_idx].order.fill(quantity);
			self.arena[ask_idx].order.fill(quantity);

			trades.push(Trade {
				bid: TradeLeg {
					order_id: self.arena[bid_idx].order.id(),
					price: bid_price,
					quantity,
				},
				ask: TradeLeg {
					order_id: self.arena[ask_idx].order.id(),
					price: ask_price,
					quantity,
				},
			});

			self.settle_bid_leg(bid_price, bid_idx, quantity);
			self.settle_ask_leg(ask_price, ask_idx, quantity);
		}

		// An immediate-or-cancel order never survives the operation that
		// admitted it: if one is left at the top of either side after the
		// loop, the opposite side ran dry before it filled.
		self.drop_resting_fill_and_kill();

		trades
	}

	fn settle_bid_leg(&mut self, price: Price, idx: usize, traded: Quantity) {
		let level = self
			.bids
			.get_mut(&Reverse(price))
			.expect("traded bid has no price level");
		level.update(LevelEvent::Match, traded);

		if self.arena[idx].order.is_filled() {
			level.unlink(&mut self.arena, idx);
			level.update(LevelEvent::Remove, self.arena[idx].order.remaining_quantity());
			let emptied = level.count == 0;
			if emptied {
				self.bids.remove(&Reverse(price));
			}
			let node = self.arena.remove(idx);
			self.index.remove(&node.order.id());
		}
	}

	fn settle_ask_leg(&mut self, price: Price, idx: usize, traded: Quantity) {
		let level = self
			.asks
			.get_mut(&price)
			.expect("traded ask has no price level");
		level.update(LevelEvent::Match, traded);

		if self.arena[idx].order.is_filled() {
			level.unlink(&mut self.arena, idx);
			level.update(LevelEvent::Remove, self.arena[idx].order.remaining_quantity());
			let emptied = level.count == 0;
			if emptied {
				self.asks.remove(&price);
			}
			let node = self.arena.remove(idx);
			self.index.remove(&node.order.id());
		}
	}

	fn drop_resting_fill_and_kill(&mut self) {
		if let Some(price) = self.best_bid() {
			let head = self.bids[&Reverse(price)]
				.head
				.expect("non-empty bid level has a head");
			let order = &self.arena[head].order;
			if order.order_type() == OrderType::FillAndKill {
				let id = order.id();
				self.cancel_order(id);
			}
		}

		if let Some(price) = self.best_ask() {
			let head = self.asks[&price]
				.head
				.expect("non-empty ask level has a head");
			let order = &self.arena[head].order;
			if order.order_type() == OrderType::FillAndKill {
				let id = order.id();
				self.cancel_order(id);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gtc(id: OrderId, side: Side, price: Price, quantity: Quantity) -> Order {
		Order::new(OrderType::GoodTillCancel, id, side, price, quantity).unwrap()
	}

	#[test]
	fn test_add_and_cancel_order() {
		let mut book = OrderBook::new();

		let trades = book.add_order(gtc(1, Side::Buy, 100, 10));
		assert!(trades.is_empty());
		assert_eq!(book.size(), 1);
		assert_eq!(book.best_bid(), Some(100));

		book.cancel_order(1);
		assert_eq!(book.size(), 0);
		assert_eq!(book.best_bid(), None);
		assert_eq!(book.depth(), Depth::default());
	}

	#[test]
	fn test_cancel_unknown_is_noop() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 10));
		book.cancel_order(999);
		assert_eq!(book.size(), 1);
	}

	#[test]
	fn test_duplicate_id_ignored() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 10));
		let trades = book.add_order(gtc(1, Side::Sell, 100, 10));
		assert!(trades.is_empty());
		assert_eq!(book.size(), 1);
		assert_eq!(book.best_ask(), None);
	}

	#[test]
	fn test_price_priority() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 1));
		book.add_order(gtc(2, Side::Buy, 101, 1));
		book.add_order(gtc(3, Side::Buy, 99, 1));
		assert_eq!(book.best_bid(), Some(101));

		book.cancel_order(2);
		assert_eq!(book.best_bid(), Some(100));
	}

	#[test]
	fn test_time_priority_at_same_price() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 1));
		book.add_order(gtc(2, Side::Sell, 100, 1));
		book.add_order(gtc(3, Side::Sell, 100, 1));

		let trades = book.add_order(gtc(4, Side::Buy, 100, 3));
		assert_eq!(trades.len(), 3);
		assert_eq!(trades[0].ask.order_id, 1);
		assert_eq!(trades[1].ask.order_id, 2);
		assert_eq!(trades[2].ask.order_id, 3);
	}

	#[test]
	fn test_simple_cross() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 10));
		assert_eq!(book.size(), 1);

		let trades = book.add_order(gtc(2, Side::Sell, 100, 10));
		assert_eq!(book.size(), 0);
		assert_eq!(trades.len(), 1);
		assert_eq!(trades[0].bid, TradeLeg { order_id: 1, price: 100, quantity: 10 });
		assert_eq!(trades[0].ask, TradeLeg { order_id: 2, price: 100, quantity: 10 });
	}

	#[test]
	fn test_partial_fill_rests_remainder() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 4));

		let trades = book.add_order(gtc(2, Side::Buy, 100, 10));
		assert_eq!(trades.len(), 1);
		assert_eq!(trades[0].bid.quantity, 4);
		assert_eq!(book.size(), 1);
		assert_eq!(book.order(2).unwrap().remaining_quantity(), 6);
		assert_eq!(book.best_bid(), Some(100));
		assert_eq!(book.best_ask(), None);
	}

	#[test]
	fn test_trade_legs_priced_per_order() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 102, 5));
		let trades = book.add_order(gtc(2, Side::Sell, 100, 5));

		assert_eq!(trades.len(), 1);
		assert_eq!(trades[0].bid.price, 102);
		assert_eq!(trades[0].ask.price, 100);
		assert!(trades[0].bid.price >= trades[0].ask.price);
	}

	#[test]
	fn test_fill_and_kill_rejected_when_not_marketable() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 101, 5));

		let trades = book.add_order(
			Order::new(OrderType::FillAndKill, 2, Side::Buy, 100, 5).unwrap(),
		);
		assert!(trades.is_empty());
		assert_eq!(book.size(), 1);
	}

	#[test]
	fn test_fill_and_kill_partial_then_dropped() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 3));

		let trades = book.add_order(
			Order::new(OrderType::FillAndKill, 2, Side::Buy, 100, 10).unwrap(),
		);
		assert_eq!(trades.len(), 1);
		assert_eq!(trades[0].ask.quantity, 3);
		assert_eq!(book.size(), 0);
		assert!(book.order(2).is_none());
	}

	#[test]
	fn test_fill_or_kill_insufficient_depth() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 5));
		book.add_order(gtc(2, Side::Sell, 101, 5));

		// Only 5 units are available at or below 100.
		let trades = book.add_order(
			Order::new(OrderType::FillOrKill, 3, Side::Buy, 100, 10).unwrap(),
		);
		assert!(trades.is_empty());
		assert_eq!(book.size(), 2);
		assert_eq!(book.depth().asks.len(), 2);
	}

	#[test]
	fn test_fill_or_kill_sweeps_levels() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 5));
		book.add_order(gtc(2, Side::Sell, 101, 5));

		let trades = book.add_order(
			Order::new(OrderType::FillOrKill, 3, Side::Buy, 101, 10).unwrap(),
		);
		assert_eq!(trades.len(), 2);
		assert_eq!(trades[0].ask, TradeLeg { order_id: 1, price: 100, quantity: 5 });
		assert_eq!(trades[1].ask, TradeLeg { order_id: 2, price: 101, quantity: 5 });
		assert_eq!(book.size(), 0);
		assert_eq!(book.best_ask(), None);
	}

	#[test]
	fn test_market_order_reprices_and_rests() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 4));
		book.add_order(gtc(2, Side::Sell, 102, 1));

		let trades = book.add_order(Order::market(3, Side::Buy, 10).unwrap());
		assert_eq!(trades.len(), 2);
		assert_eq!(trades[0].ask.price, 100);
		assert_eq!(trades[1].ask.price, 102);

		// The residual 5 rests as good-till-cancel at the worst ask.
		let residual = book.order(3).unwrap();
		assert_eq!(residual.order_type(), OrderType::GoodTillCancel);
		assert_eq!(residual.remaining_quantity(), 5);
		assert_eq!(book.best_bid(), Some(102));
		assert_eq!(book.best_ask(), None);
	}

	#[test]
	fn test_market_order_rejected_on_empty_side() {
		let mut book = OrderBook::new();
		let trades = book.add_order(Order::market(1, Side::Buy, 10).unwrap());
		assert!(trades.is_empty());
		assert_eq!(book.size(), 0);
	}

	#[test]
	fn test_level_aggregates_track_mutations() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 10));
		book.add_order(gtc(2, Side::Buy, 100, 20));
		book.add_order(gtc(3, Side::Buy, 99, 5));

		let depth = book.depth();
		assert_eq!(depth.bids, vec![
			LevelInfo { price: 100, quantity: 30 },
			LevelInfo { price: 99, quantity: 5 },
		]);

		// Partial fill debits quantity without touching the count.
		book.add_order(gtc(4, Side::Sell, 100, 15));
		let depth = book.depth();
		assert_eq!(depth.bids[0], LevelInfo { price: 100, quantity: 15 });

		// Cancel debits the remainder and evicts the emptied level.
		book.cancel_order(2);
		let depth = book.depth();
		assert_eq!(depth.bids, vec![LevelInfo { price: 99, quantity: 5 }]);
	}

	#[test]
	fn test_sides_never_overlap_after_operation() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 5));
		book.add_order(gtc(2, Side::Sell, 103, 5));
		book.add_order(gtc(3, Side::Buy, 102, 5));
		book.add_order(gtc(4, Side::Sell, 101, 8));

		if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
			assert!(bid < ask);
		}
	}

	#[test]
	fn test_locators_survive_neighbor_removal() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Sell, 100, 1));
		book.add_order(gtc(2, Side::Sell, 100, 2));
		book.add_order(gtc(3, Side::Sell, 100, 3));

		// Removing the middle order must leave the other locators valid.
		book.cancel_order(2);
		book.cancel_order(1);
		book.cancel_order(3);
		assert_eq!(book.size(), 0);
		assert_eq!(book.best_ask(), None);
	}

	#[test]
	fn test_good_for_day_ids() {
		let mut book = OrderBook::new();
		book.add_order(gtc(1, Side::Buy, 100, 5));
		book.add_order(Order::new(OrderType::GoodForDay, 2, Side::Buy, 99, 5).unwrap());
		book.add_order(Order::new(OrderType::GoodForDay, 3, Side::Sell, 105, 5).unwrap());

		let mut ids = book.good_for_day_ids();
		ids.sort_unstable();
		assert_eq!(ids, vec![2, 3]);
	}
}
