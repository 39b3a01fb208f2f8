use crate::selection::ast::{Arg, Ast, CmpOp, NumProp, StrProp};
use crate::selection::Context;

peg::parser! {
    pub(crate) grammar selection_grammar() for str {
        // Optional whitespace
        rule _ = [' ' | '\t']*
        // Mandatory whitespace
        rule __ = [' ' | '\t']+

        rule uint() -> usize
            = n:$(['0'..='9']+)
            {? n.parse().or(Err("integer")) }

        rule number() -> f64
            = n:$(("-" / "+")? ['0'..='9']+ ("." ['0'..='9']*)?
                  (("e" / "E") ("-" / "+")? ['0'..='9']+)?)
            {? n.parse().or(Err("number")) }

        rule variable() -> u8
            = "#" n:$(['1'..='4'])
            {? n.parse().or(Err("variable")) }

        // Optional tuple slot after a property: name(#2)
        rule slot() -> u8
            = "(" _ v:variable() _ ")" { v }

        rule arg() -> Arg
            = v:variable() { Arg::Variable(v) }
            / i:uint() { Arg::Index(i) }

        rule cmp_op() -> CmpOp
            = "==" { CmpOp::Eq }
            / "!=" { CmpOp::Ne }
            / "<=" { CmpOp::Le }
            / ">=" { CmpOp::Ge }
            / "<" { CmpOp::Lt }
            / ">" { CmpOp::Gt }

        rule str_prop() -> StrProp
            = "resname" { StrProp::Resname }
            / "name" { StrProp::Name }
            / "type" { StrProp::Type }

        rule num_prop() -> NumProp
            = "index" { NumProp::Index }
            / "mass" { NumProp::Mass }
            / "resid" { NumProp::Resid }
            / "vx" { NumProp::Vx }
            / "vy" { NumProp::Vy }
            / "vz" { NumProp::Vz }
            / "x" { NumProp::X }
            / "y" { NumProp::Y }
            / "z" { NumProp::Z }

        // A bare string value: anything but whitespace, parens and quotes,
        // excluding the boolean keywords
        rule str_value() -> String
            = !("and" __) !("or" __) !("not" __)
              s:$((!(" " / "\t" / "(" / ")" / "'" / "\"") [_])+)
            { s.to_owned() }

        rule str_expr() -> Ast
            = p:str_prop() v:slot()? _ "==" _ value:str_value()
              { Ast::Str { prop: p, variable: v.unwrap_or(1), equals: true, values: vec![value] } }
            / p:str_prop() v:slot()? _ "!=" _ value:str_value()
              { Ast::Str { prop: p, variable: v.unwrap_or(1), equals: false, values: vec![value] } }
            / p:str_prop() v:slot()? __ values:(str_value() ++ __)
              { Ast::Str { prop: p, variable: v.unwrap_or(1), equals: true, values } }

        rule num_expr() -> Ast
            = p:num_prop() v:slot()? _ op:cmp_op() _ value:number()
            { Ast::Num { prop: p, variable: v.unwrap_or(1), op, value } }

        rule is_bonded() -> Ast
            = "is_bonded" _ "(" _ a:arg() _ "," _ b:arg() _ ")"
            { Ast::IsBonded(a, b) }

        rule is_angle() -> Ast
            = "is_angle" _ "(" _ a:arg() _ "," _ b:arg() _ "," _ c:arg() _ ")"
            { Ast::IsAngle(a, b, c) }

        rule is_dihedral() -> Ast
            = "is_dihedral" _ "(" _ a:arg() _ "," _ b:arg() _ "," _ c:arg() _ "," _ d:arg() _ ")"
            { Ast::IsDihedral(a, b, c, d) }

        rule is_improper() -> Ast
            = "is_improper" _ "(" _ a:arg() _ "," _ b:arg() _ "," _ c:arg() _ "," _ d:arg() _ ")"
            { Ast::IsImproper(a, b, c, d) }

        // and/or share one precedence tier and associate left to right;
        // a prefix not applies to the whole expression after it
        pub rule expr() -> Ast = precedence! {
            // Binary
            lhs:(@) __ "or" __ rhs:@ { Ast::Or(Box::new(lhs), Box::new(rhs)) }
            lhs:(@) __ "and" __ rhs:@ { Ast::And(Box::new(lhs), Box::new(rhs)) }
            // Unary prefix
            "not" __ inner:@ { Ast::Not(Box::new(inner)) }
            --
            "all" { Ast::All }
            "none" { Ast::None }
            e:is_bonded() { e }
            e:is_angle() { e }
            e:is_dihedral() { e }
            e:is_improper() { e }
            e:str_expr() { e }
            e:num_expr() { e }
            "(" _ e:expr() _ ")" { e }
        }

        rule context() -> Context
            = "atoms" _ ":" { Context::Atoms }
            / "pairs" _ ":" { Context::Pairs }
            / "two" _ ":" { Context::Pairs }
            / "three" _ ":" { Context::Three }
            / "four" _ ":" { Context::Four }
            / "bonds" _ ":" { Context::Bonds }
            / "angles" _ ":" { Context::Angles }
            / "dihedrals" _ ":" { Context::Dihedrals }
            / "impropers" _ ":" { Context::Impropers }

        rule context_prefix() -> Context
            = c:context() _ { c }

        pub rule selection() -> (Context, Ast)
            = _ c:context_prefix()? e:expr() _
            { (c.unwrap_or(Context::Atoms), e) }
    }
}
