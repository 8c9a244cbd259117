//! Even split of an expense across its participants.
//!
//! Amounts are handled as whole cents so the shares always add back up to
//! the expense total. Leftover cents go one at a time to the participants at
//! the front of the list, so the same input always produces the same split.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("an expense must be split across at least one participant")]
    NoParticipants,
    #[error("amount must not be negative")]
    NegativeAmount,
    #[error("amount must have at most two decimal places")]
    SubCentAmount,
    #[error("amount is too large")]
    AmountOutOfRange,
    #[error("payer must be one of the participants")]
    PayerNotParticipant,
    #[error("participants must be distinct")]
    DuplicateParticipant,
}

/// One participant's portion of a split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share<P> {
    pub participant: P,
    pub amount: Decimal,
    pub is_paid: bool,
}

/// Converts a two-place decimal into whole cents.
pub fn to_cents(amount: Decimal) -> Result<i64, SplitError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SplitError::NegativeAmount);
    }
    let cents = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(SplitError::AmountOutOfRange)?;
    if !cents.fract().is_zero() {
        return Err(SplitError::SubCentAmount);
    }
    cents.to_i64().ok_or(SplitError::AmountOutOfRange)
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Splits `total` across `participants` as evenly as cents allow.
///
/// The payer's share is marked paid, every other share is outstanding.
pub fn split_evenly<P>(
    total: Decimal,
    participants: &[P],
    payer: &P,
) -> Result<Vec<Share<P>>, SplitError>
where
    P: Clone + PartialEq,
{
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    let cents = to_cents(total)?;
    if !participants.contains(payer) {
        return Err(SplitError::PayerNotParticipant);
    }
    for (index, participant) in participants.iter().enumerate() {
        if participants[..index].contains(participant) {
            return Err(SplitError::DuplicateParticipant);
        }
    }

    let count = i64::try_from(participants.len()).map_err(|_| SplitError::AmountOutOfRange)?;
    let base = cents / count;
    let remainder = cents % count;

    let shares = participants
        .iter()
        .zip(0_i64..)
        .map(|(participant, position)| {
            let extra = if position < remainder { 1 } else { 0 };
            Share {
                participant: participant.clone(),
                amount: from_cents(base + extra),
                is_paid: participant == payer,
            }
        })
        .collect();
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn amounts(shares: &[Share<&str>]) -> Vec<Decimal> {
        shares.iter().map(|share| share.amount).collect()
    }

    #[test]
    fn even_split_between_two_members() {
        let shares = split_evenly(dec!(100.00), &["alice", "bob"], &"alice").unwrap();
        assert_eq!(
            shares,
            vec![
                Share {
                    participant: "alice",
                    amount: dec!(50.00),
                    is_paid: true,
                },
                Share {
                    participant: "bob",
                    amount: dec!(50.00),
                    is_paid: false,
                },
            ]
        );
    }

    #[test]
    fn remainder_cent_goes_to_first_member() {
        let shares = split_evenly(dec!(10.00), &["alice", "bob", "carol"], &"carol").unwrap();
        assert_eq!(amounts(&shares), vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
        assert!(shares[2].is_paid);
        assert!(!shares[0].is_paid);
    }

    #[rstest]
    #[case(dec!(0.02), &["a", "b", "c"], &[dec!(0.01), dec!(0.01), dec!(0.00)])]
    #[case(dec!(0.00), &["a", "b"], &[dec!(0.00), dec!(0.00)])]
    #[case(dec!(7), &["a"], &[dec!(7.00)])]
    #[case(
        dec!(1.00),
        &["a", "b", "c", "d", "e", "f"],
        &[dec!(0.17), dec!(0.17), dec!(0.17), dec!(0.17), dec!(0.16), dec!(0.16)]
    )]
    fn splits_match_expected_amounts(
        #[case] total: Decimal,
        #[case] participants: &[&str],
        #[case] expected: &[Decimal],
    ) {
        let shares = split_evenly(total, participants, &participants[0]).unwrap();
        assert_eq!(amounts(&shares), expected);
    }

    #[rstest]
    #[case(dec!(10.00), &[], "a", SplitError::NoParticipants)]
    #[case(dec!(-1.00), &["a"], "a", SplitError::NegativeAmount)]
    #[case(dec!(1.005), &["a"], "a", SplitError::SubCentAmount)]
    #[case(dec!(10.00), &["a", "b"], "z", SplitError::PayerNotParticipant)]
    #[case(dec!(10.00), &["a", "b", "a"], "a", SplitError::DuplicateParticipant)]
    fn rejects_invalid_input(
        #[case] total: Decimal,
        #[case] participants: &[&str],
        #[case] payer: &str,
        #[case] expected: SplitError,
    ) {
        assert_eq!(split_evenly(total, participants, &payer), Err(expected));
    }

    #[test]
    fn trailing_zeros_are_not_sub_cent() {
        assert_eq!(to_cents(dec!(12.3400)), Ok(1234));
    }

    proptest! {
        #[test]
        fn shares_sum_to_total_and_stay_within_a_cent(
            cents in 0_i64..10_000_000,
            count in 1_usize..40,
            payer_index in 0_usize..40,
        ) {
            let participants: Vec<usize> = (0..count).collect();
            let payer = payer_index % count;
            let total = from_cents(cents);

            let shares = split_evenly(total, &participants, &payer).unwrap();

            let sum: Decimal = shares.iter().map(|share| share.amount).sum();
            prop_assert_eq!(sum, total);

            let max = shares.iter().map(|share| share.amount).max().unwrap();
            let min = shares.iter().map(|share| share.amount).min().unwrap();
            prop_assert!(max - min <= dec!(0.01));
            prop_assert!(min >= Decimal::ZERO);

            let paid: Vec<usize> = shares
                .iter()
                .filter(|share| share.is_paid)
                .map(|share| share.participant)
                .collect();
            prop_assert_eq!(paid, vec![payer]);
        }

        #[test]
        fn identical_input_gives_identical_split(
            cents in 0_i64..1_000_000,
            count in 1_usize..12,
        ) {
            let participants: Vec<usize> = (0..count).collect();
            let total = from_cents(cents);
            let first = split_evenly(total, &participants, &0).unwrap();
            let second = split_evenly(total, &participants, &0).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
