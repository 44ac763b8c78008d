// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lead records and lead scoring.
//!
//! Scoring is a weighted sum over the qualifying fields a lead filled in.
//! The weights live in [`ScoringWeights`]; the shape of the calculation does
//! not depend on them.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound on any lead score.
pub const MAX_LEAD_SCORE: u32 = 100;

/// Consumer mail providers. Addresses on these domains do not count as
/// business email.
pub const FREE_MAIL_DOMAINS: &[&str] = &[
	"gmail.com",
	"googlemail.com",
	"yahoo.com",
	"hotmail.com",
	"outlook.com",
	"live.com",
	"msn.com",
	"icloud.com",
	"me.com",
	"aol.com",
	"proton.me",
	"protonmail.com",
	"gmx.com",
	"mail.com",
	"yandex.com",
];

macro_rules! tier_enum {
	(
		$(#[$meta:meta])*
		$name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		pub enum $name {
			$(
				#[serde(rename = $text)]
				$variant,
			)+
		}

		impl $name {
			pub fn as_str(&self) -> &'static str {
				match self {
					$($name::$variant => $text,)+
				}
			}
		}

		impl std::str::FromStr for $name {
			type Err = CoreError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s.trim() {
					$($text => Ok($name::$variant),)+
					other => Err(CoreError::InvalidTier {
						kind: $kind,
						value: other.to_string(),
					}),
				}
			}
		}
	};
}

tier_enum! {
	/// Declared company headcount.
	CompanySize, "company size" {
		Micro => "1-10",
		Small => "11-50",
		Medium => "51-200",
		Large => "200+",
	}
}

tier_enum! {
	/// Declared project budget.
	BudgetTier, "budget" {
		Under10k => "under-10k",
		From10kTo50k => "10k-50k",
		From50kTo100k => "50k-100k",
		Over100k => "100k-plus",
	}
}

tier_enum! {
	/// How soon the lead wants to start.
	Urgency, "urgency" {
		Exploring => "exploring",
		ThisQuarter => "this-quarter",
		ThisMonth => "this-month",
		Immediate => "immediate",
	}
}

/// A submitted lead. Built from a form submission, scored, forwarded and
/// discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
	pub email: String,
	pub form_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub company: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub company_size: Option<CompanySize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub budget: Option<BudgetTier>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub urgency: Option<Urgency>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// Form-specific fields the scorer does not look at.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LeadRecord {
	pub fn new(email: impl Into<String>, form_type: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			form_type: form_type.into(),
			..Default::default()
		}
	}

	pub fn with_company(mut self, company: impl Into<String>) -> Self {
		self.company = Some(company.into());
		self
	}

	pub fn with_company_size(mut self, size: CompanySize) -> Self {
		self.company_size = Some(size);
		self
	}

	pub fn with_budget(mut self, budget: BudgetTier) -> Self {
		self.budget = Some(budget);
		self
	}

	pub fn with_urgency(mut self, urgency: Urgency) -> Self {
		self.urgency = Some(urgency);
		self
	}

	pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
		self.phone = Some(phone.into());
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	/// The lowercased domain part of the email, if it has one.
	pub fn email_domain(&self) -> Option<String> {
		let (local, domain) = self.email.trim().rsplit_once('@')?;
		if local.is_empty() || !domain.contains('.') {
			return None;
		}
		Some(domain.to_ascii_lowercase())
	}

	pub fn has_business_email(&self) -> bool {
		self
			.email_domain()
			.is_some_and(|domain| !FREE_MAIL_DOMAINS.contains(&domain.as_str()))
	}
}

/// Point values for each qualifying field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringWeights {
	pub business_email: u32,
	pub company_name: u32,
	pub company_size_micro: u32,
	pub company_size_small: u32,
	pub company_size_medium: u32,
	pub company_size_large: u32,
	pub budget_under_10k: u32,
	pub budget_10k_50k: u32,
	pub budget_50k_100k: u32,
	pub budget_over_100k: u32,
	pub urgency_exploring: u32,
	pub urgency_this_quarter: u32,
	pub urgency_this_month: u32,
	pub urgency_immediate: u32,
	pub phone: u32,
	pub message_short: u32,
	pub message_medium: u32,
	pub message_long: u32,
	/// Messages shorter than this many characters are "short".
	pub message_medium_min_chars: usize,
	/// Messages at least this many characters long are "long".
	pub message_long_min_chars: usize,
}

impl Default for ScoringWeights {
	fn default() -> Self {
		Self {
			business_email: 20,
			company_name: 15,
			company_size_micro: 5,
			company_size_small: 10,
			company_size_medium: 15,
			company_size_large: 20,
			budget_under_10k: 5,
			budget_10k_50k: 10,
			budget_50k_100k: 20,
			budget_over_100k: 30,
			urgency_exploring: 0,
			urgency_this_quarter: 10,
			urgency_this_month: 15,
			urgency_immediate: 25,
			phone: 10,
			message_short: 5,
			message_medium: 10,
			message_long: 15,
			message_medium_min_chars: 50,
			message_long_min_chars: 200,
		}
	}
}

impl ScoringWeights {
	fn company_size(&self, size: CompanySize) -> u32 {
		match size {
			CompanySize::Micro => self.company_size_micro,
			CompanySize::Small => self.company_size_small,
			CompanySize::Medium => self.company_size_medium,
			CompanySize::Large => self.company_size_large,
		}
	}

	fn budget(&self, budget: BudgetTier) -> u32 {
		match budget {
			BudgetTier::Under10k => self.budget_under_10k,
			BudgetTier::From10kTo50k => self.budget_10k_50k,
			BudgetTier::From50kTo100k => self.budget_50k_100k,
			BudgetTier::Over100k => self.budget_over_100k,
		}
	}

	fn urgency(&self, urgency: Urgency) -> u32 {
		match urgency {
			Urgency::Exploring => self.urgency_exploring,
			Urgency::ThisQuarter => self.urgency_this_quarter,
			Urgency::ThisMonth => self.urgency_this_month,
			Urgency::Immediate => self.urgency_immediate,
		}
	}

	fn message(&self, message: &str) -> u32 {
		match message.trim().chars().count() {
			0 => 0,
			n if n >= self.message_long_min_chars => self.message_long,
			n if n >= self.message_medium_min_chars => self.message_medium,
			_ => self.message_short,
		}
	}
}

fn non_blank(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Scores a lead with the default weight table.
pub fn calculate_lead_score(lead: &LeadRecord) -> u32 {
	calculate_lead_score_with(lead, &ScoringWeights::default())
}

/// Scores a lead with a custom weight table. Absent fields contribute zero
/// and the total is capped at [`MAX_LEAD_SCORE`].
pub fn calculate_lead_score_with(lead: &LeadRecord, weights: &ScoringWeights) -> u32 {
	let mut score = 0u32;

	if lead.has_business_email() {
		score = score.saturating_add(weights.business_email);
	}
	if non_blank(&lead.company).is_some() {
		score = score.saturating_add(weights.company_name);
	}
	if let Some(size) = lead.company_size {
		score = score.saturating_add(weights.company_size(size));
	}
	if let Some(budget) = lead.budget {
		score = score.saturating_add(weights.budget(budget));
	}
	if let Some(urgency) = lead.urgency {
		score = score.saturating_add(weights.urgency(urgency));
	}
	if non_blank(&lead.phone).is_some() {
		score = score.saturating_add(weights.phone);
	}
	if let Some(message) = non_blank(&lead.message) {
		score = score.saturating_add(weights.message(message));
	}

	score.min(MAX_LEAD_SCORE)
}
