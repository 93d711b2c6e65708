use std::ops::RangeFrom;

use arrayvec::ArrayVec;
use nom::error::{make_error, ErrorKind, ParseError};
use nom::{Err, IResult, InputIter, InputLength, Parser, Slice};

/// Parse a big-endian 24-bit unsigned integer.
pub fn be_u24<I, E: ParseError<I>>(input: I) -> IResult<I, u32, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 3;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u32;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u32;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Parse a big-endian 48-bit unsigned integer.
pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Write a 24-bit big-endian integer. The value must fit in 24 bits.
pub fn put_u24(out: &mut Vec<u8>, value: u32) {
    debug_assert!(value <= 0x00FF_FFFF);
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

/// Write a 48-bit big-endian integer. The value must fit in 48 bits.
pub fn put_u48(out: &mut Vec<u8>, value: u64) {
    debug_assert!(value <= 0x0000_FFFF_FFFF_FFFF);
    out.extend_from_slice(&value.to_be_bytes()[2..]);
}

/// Apply a parser one or more times into a bounded `ArrayVec`.
///
/// Items beyond the capacity are parsed and dropped rather than failing,
/// so oversized-but-wellformed protocol vectors truncate instead of
/// aborting the parse.
#[inline(always)]
pub fn many1<I, O, E, F, const CAP: usize>(
    mut f: F,
) -> impl FnMut(I) -> IResult<I, ArrayVec<O, CAP>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    E: ParseError<I>,
{
    move |i: I| {
        let len = i.input_len();
        match f.parse(i.clone()) {
            Err(Err::Error(err)) => Err(Err::Error(E::append(i, ErrorKind::Many1, err))),
            Err(e) => Err(e),
            Ok((mut i1, o)) => {
                if i1.input_len() == len {
                    return Err(Err::Error(E::from_error_kind(i, ErrorKind::Many1)));
                }

                let mut acc = ArrayVec::new();
                acc.push(o);

                loop {
                    let len = i1.input_len();
                    match f.parse(i1.clone()) {
                        Err(Err::Error(_)) => return Ok((i1, acc)),
                        Err(e) => return Err(e),
                        Ok((i2, o)) => {
                            if i2.input_len() == len {
                                return Err(Err::Error(E::from_error_kind(i1, ErrorKind::Many1)));
                            }

                            i1 = i2;
                            if !acc.is_full() {
                                acc.push(o);
                            }
                        }
                    }
                }
            }
        }
    }
}
