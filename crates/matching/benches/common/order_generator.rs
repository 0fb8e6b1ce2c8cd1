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

use crucible_matching::{Order, OrderType, Price, Side};

#[derive(Clone, Copy)]
pub enum Scenario {
	/// Bids and asks far apart: pure insertion load, nothing trades.
	NoCross,
	/// Alternating sides at one price: every second order crosses.
	CrossHeavy,
}

/// Deterministic order stream for benchmarks. Same sequence every run.
pub struct OrderGenerator {
	counter: u64,
	scenario: Scenario,
}

impl OrderGenerator {
	pub fn new(scenario: Scenario) -> Self {
		Self {
			counter: 0,
			scenario,
		}
	}

	pub fn next_order(&mut self) -> Order {
		self.counter += 1;
		let id = self.counter;

		match self.scenario {
			Scenario::NoCross => {
				let offset = (self.counter % 1000) as Price;
				if self.counter % 2 == 0 {
					Order::new(OrderType::GoodTillCancel, id, Side::Buy, 44_000 + offset, 1)
						.unwrap()
				} else {
					Order::new(OrderType::GoodTillCancel, id, Side::Sell, 56_000 + offset, 1)
						.unwrap()
				}
			}
			Scenario::CrossHeavy => {
				let side = if self.counter % 2 == 0 {
					Side::Buy
				} else {
					Side::Sell
				};
				Order::new(OrderType::GoodTillCancel, id, side, 50_000, 10).unwrap()
			}
		}
	}

	pub fn orders(&mut self, count: usize) -> Vec<Order> {
		(0..count).map(|_| self.next_order()).collect()
	}
}
