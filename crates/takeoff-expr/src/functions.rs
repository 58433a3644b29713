use std::fmt;

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Self::Exact(n) => count == n,
            Self::Range(min, max) => (min..=max).contains(&count),
            Self::AtLeast(min) => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Range(min, max) => write!(f, "{min} to {max}"),
            Self::AtLeast(min) => write!(f, "at least {min}"),
        }
    }
}

/// The allow-listed pure functions. Nothing else can be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sqrt,
    Pow,
    Abs,
    Min,
    Max,
    Round,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
}

impl Function {
    pub const ALL: [Function; 11] = [
        Function::Sqrt,
        Function::Pow,
        Function::Abs,
        Function::Min,
        Function::Max,
        Function::Round,
        Function::Floor,
        Function::Ceil,
        Function::Sin,
        Function::Cos,
        Function::Tan,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Pow => Arity::Exact(2),
            Self::Min | Self::Max => Arity::AtLeast(2),
            Self::Round => Arity::Range(1, 2),
            _ => Arity::Exact(1),
        }
    }

    /// Apply to already-evaluated arguments. The parser guarantees the
    /// argument count matches [`Function::arity`].
    pub fn apply(&self, args: &[f64]) -> f64 {
        let first = args.first().copied().unwrap_or(f64::NAN);
        match self {
            Self::Sqrt => first.sqrt(),
            Self::Pow => first.powf(args.get(1).copied().unwrap_or(f64::NAN)),
            Self::Abs => first.abs(),
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Round => round_to(first, args.get(1).map_or(0, |p| p.trunc() as i32)),
            Self::Floor => first.floor(),
            Self::Ceil => first.ceil(),
            Self::Sin => first.sin(),
            Self::Cos => first.cos(),
            Self::Tan => first.tan(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named constants usable in any expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub const ALL: [Constant; 2] = [Constant::Pi, Constant::E];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pi => "pi",
            Self::E => "e",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Pi => std::f64::consts::PI,
            Self::E => std::f64::consts::E,
        }
    }
}

/// `true` for names owned by a function or constant.
pub fn is_reserved(name: &str) -> bool {
    Function::lookup(name).is_some() || Constant::lookup(name).is_some()
}

/// Round half away from zero to `places` decimal places. Negative `places`
/// rounds to tens, hundreds and so on.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let rounded = if places >= 0 {
        let scale = 10f64.powi(places);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-places);
        (value / scale).round() * scale
    };
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
