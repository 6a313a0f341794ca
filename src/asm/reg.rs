use std::fmt::Display;

/// General purpose and SSE registers, in every width the generator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Eax,
    Al,
    Rcx,
    Ecx,
    Cl,
    Rdx,
    Edx,
    Dl,
    Rdi,
    Edi,
    Dil,
    Rsi,
    Esi,
    Sil,
    R8,
    R8d,
    R8b,
    R9,
    R9d,
    R9b,
    Rbp,
    Rsp,
    Xmm(u8),
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Reg::*;

        match self {
            Rax => f.write_str("%rax"),
            Eax => f.write_str("%eax"),
            Al => f.write_str("%al"),
            Rcx => f.write_str("%rcx"),
            Ecx => f.write_str("%ecx"),
            Cl => f.write_str("%cl"),
            Rdx => f.write_str("%rdx"),
            Edx => f.write_str("%edx"),
            Dl => f.write_str("%dl"),
            Rdi => f.write_str("%rdi"),
            Edi => f.write_str("%edi"),
            Dil => f.write_str("%dil"),
            Rsi => f.write_str("%rsi"),
            Esi => f.write_str("%esi"),
            Sil => f.write_str("%sil"),
            R8 => f.write_str("%r8"),
            R8d => f.write_str("%r8d"),
            R8b => f.write_str("%r8b"),
            R9 => f.write_str("%r9"),
            R9d => f.write_str("%r9d"),
            R9b => f.write_str("%r9b"),
            Rbp => f.write_str("%rbp"),
            Rsp => f.write_str("%rsp"),
            Xmm(n) => write!(f, "%xmm{n}"),
        }
    }
}

impl Reg {
    /// Project a register onto the name matching an operand size in bytes.
    pub fn to_sized(self, size: usize) -> Reg {
        use Reg::*;

        match (self, size) {
            (Rax | Eax | Al, 1) => Al,
            (Rax | Eax | Al, 4) => Eax,
            (Rax | Eax | Al, 8) => Rax,
            (Rcx | Ecx | Cl, 1) => Cl,
            (Rcx | Ecx | Cl, 4) => Ecx,
            (Rcx | Ecx | Cl, 8) => Rcx,
            (Rdx | Edx | Dl, 1) => Dl,
            (Rdx | Edx | Dl, 4) => Edx,
            (Rdx | Edx | Dl, 8) => Rdx,
            (Rdi | Edi | Dil, 1) => Dil,
            (Rdi | Edi | Dil, 4) => Edi,
            (Rdi | Edi | Dil, 8) => Rdi,
            (Rsi | Esi | Sil, 1) => Sil,
            (Rsi | Esi | Sil, 4) => Esi,
            (Rsi | Esi | Sil, 8) => Rsi,
            (R8 | R8d | R8b, 1) => R8b,
            (R8 | R8d | R8b, 4) => R8d,
            (R8 | R8d | R8b, 8) => R8,
            (R9 | R9d | R9b, 1) => R9b,
            (R9 | R9d | R9b, 4) => R9d,
            (R9 | R9d | R9b, 8) => R9,
            (reg, _) => reg,
        }
    }
}

/// The six integer argument registers of the System V AMD64 ABI, in order.
pub const ARG_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing() {
        assert_eq!(Reg::Rax.to_sized(1), Reg::Al);
        assert_eq!(Reg::Rax.to_sized(4), Reg::Eax);
        assert_eq!(Reg::Eax.to_sized(8), Reg::Rax);
        assert_eq!(Reg::Rdi.to_sized(1), Reg::Dil);
        assert_eq!(Reg::R9.to_sized(4), Reg::R9d);
        assert_eq!(Reg::Rbp.to_sized(4), Reg::Rbp);
    }

    #[test]
    fn test_display() {
        assert_eq!(Reg::Rax.to_string(), "%rax");
        assert_eq!(Reg::Dil.to_string(), "%dil");
        assert_eq!(Reg::Xmm(3).to_string(), "%xmm3");
    }
}
