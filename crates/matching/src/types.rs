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

use serde::{Deserialize, Serialize};

/// Price in tick units. Signed, because some instruments trade at negative
/// prices.
pub type Price = i32;

/// Order size in units of the instrument.
pub type Quantity = u32;

/// Unique identifier of a live order. Ids may be reused after the order
/// they named has been filled or cancelled.
pub type OrderId = u64;

/// Placeholder price carried by market orders until admission reprices them.
pub const INVALID_PRICE: Price = Price::MIN;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Buy,
	Sell,
}

/// Behavioral type of an order
///
/// The type decides admission (whether the order may enter the book at
/// all) and what happens to any unfilled remainder after matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
	/// Sweep the opposite side at the best available prices. Repriced at
	/// admission to the worst opposite-side price so any remainder can
	/// rest; rejected when the opposite side is empty.
	Market,
	/// Rests until filled or cancelled, and is swept by the session-close
	/// pruner.
	GoodForDay,
	/// Rests until filled or cancelled.
	GoodTillCancel,
	/// Immediate-or-cancel: execute whatever is immediately available,
	/// drop the rest.
	FillAndKill,
	/// All-or-nothing: execute the full quantity immediately or not at all.
	FillOrKill,
}

/// Error types for order construction
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
	#[error("order {0}: initial quantity must be positive")]
	ZeroQuantity(OrderId),
}

/// A single order owned by the book from admission until it is fully
/// filled or cancelled.
///
/// The quantity counter only ever decreases: `fill` debits it and nothing
/// credits it back. Fields stay private so that invariant cannot be
/// bypassed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	id: OrderId,
	order_type: OrderType,
	side: Side,
	price: Price,
	initial_quantity: Quantity,
	remaining_quantity: Quantity,
}

impl Order {
	/// Create an order. Rejects a zero initial quantity.
	pub fn new(
		order_type: OrderType,
		id: OrderId,
		side: Side,
		price: Price,
		quantity: Quantity,
	) -> Result<Self, OrderError> {
		if quantity == 0 {
			return Err(OrderError::ZeroQuantity(id));
		}

		Ok(Self {
			id,
			order_type,
			side,
			price,
			initial_quantity: quantity,
			remaining_quantity: quantity,
		})
	}

	/// Create a market order. The price is a placeholder; admission
	/// reprices the order before the price is ever read.
	pub fn market(id: OrderId, side: Side, quantity: Quantity) -> Result<Self, OrderError> {
		Self::new(OrderType::Market, id, side, INVALID_PRICE, quantity)
	}

	pub fn id(&self) -> OrderId {
		self.id
	}

	pub fn order_type(&self) -> OrderType {
		self.order_type
	}

	pub fn side(&self) -> Side {
		self.side
	}

	pub fn price(&self) -> Price {
		self.price
	}

	pub fn initial_quantity(&self) -> Quantity {
		self.initial_quantity
	}

	pub fn remaining_quantity(&self) -> Quantity {
		self.remaining_quantity
	}

	pub fn filled_quantity(&self) -> Quantity {
		self.initial_quantity - self.remaining_quantity
	}

	pub fn is_filled(&self) -> bool {
		self.remaining_quantity == 0
	}

	/// Debit `quantity` from the remaining amount.
	///
	/// The matching loop never trades more than an order has left, so an
	/// over-fill here is a programming error and aborts; the debit happens
	/// only once the amount is known to be valid.
	pub fn fill(&mut self, quantity: Quantity) {
		assert!(
			quantity <= self.remaining_quantity,
			"order {} cannot be filled for more than its remaining quantity",
			self.id
		);
		self.remaining_quantity -= quantity;
	}

	/// One-shot conversion of a market order into a resting limit order at
	/// the worst opposite-side price. Calling this on any other type is a
	/// programming error.
	pub(crate) fn to_good_till_cancel(&mut self, price: Price) {
		assert!(
			self.order_type == OrderType::Market,
			"order {} is not a market order",
			self.id
		);
		self.price = price;
		self.order_type = OrderType::GoodTillCancel;
	}
}

/// Request to replace a resting order's side, price, or quantity
///
/// The original order's type is preserved; its time priority is not. The
/// engine applies an update as a cancel followed by a fresh admission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderUpdate {
	pub id: OrderId,
	pub side: Side,
	pub price: Price,
	pub quantity: Quantity,
}

impl OrderUpdate {
	/// Build the replacement order, carrying over the preserved type.
	pub fn into_order(self, order_type: OrderType) -> Result<Order, OrderError> {
		Order::new(order_type, self.id, self.side, self.price, self.quantity)
	}
}

/// One side of an execution: which order traded, at what price, how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLeg {
	pub order_id: OrderId,
	pub price: Price,
	pub quantity: Quantity,
}

/// A single execution between the resting bid and ask queues
///
/// Both legs carry the same quantity; each leg is priced at its own
/// order's limit, so `bid.price >= ask.price` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
	pub bid: TradeLeg,
	pub ask: TradeLeg,
}

/// Aggregated resting quantity at a single price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
	pub price: Price,
	pub quantity: Quantity,
}

/// Aggregated view of both sides of the book
///
/// Bids are ordered highest price first, asks lowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth {
	pub bids: Vec<LevelInfo>,
	pub asks: Vec<LevelInfo>,
}
